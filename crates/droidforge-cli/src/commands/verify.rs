use std::path::PathBuf;

use droidforge_pack::{verify_apk, VerifyReport};

pub struct VerifyArgs {
    pub apk: PathBuf,
    /// When set, the embedded signer key must match.
    pub public_key_hex: Option<String>,
}

pub fn run(args: VerifyArgs) -> Result<VerifyReport, String> {
    let report = verify_apk(&args.apk)
        .map_err(|err| format!("'{}' failed verification: {}", args.apk.display(), err))?;
    if let Some(expected) = args.public_key_hex {
        let expected = expected.trim().to_ascii_lowercase();
        if report.public_key_hex != expected {
            return Err(format!(
                "'{}' is signed by {}, expected {}",
                args.apk.display(),
                report.public_key_hex,
                expected
            ));
        }
    }
    Ok(report)
}
