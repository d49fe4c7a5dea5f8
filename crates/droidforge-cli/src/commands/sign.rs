use std::path::PathBuf;

use droidforge_pack::{sign_apk, SignSummary, SigningKeyPair};

pub struct SignArgs {
    pub apk: PathBuf,
    /// Defaults to signing in place.
    pub out: Option<PathBuf>,
    pub private_key_hex: String,
}

pub fn run(args: SignArgs) -> Result<SignSummary, String> {
    let key = SigningKeyPair::from_hex(args.private_key_hex.trim())
        .map_err(|err| format!("invalid signing key: {}", err))?;
    let output = args.out.unwrap_or_else(|| args.apk.clone());
    sign_apk(&args.apk, &output, &key)
        .map_err(|err| format!("failed to sign '{}': {}", args.apk.display(), err))
}
