use droidforge_core::{BuildError, BuildPhase};
use droidforge_pack::{sign_apk, SigningKeyPair};

use crate::artifacts::{SIGNED_APK, UNSIGNED_APK};
use crate::session::BuildSession;
use crate::task::Task;

const PHASE: BuildPhase = BuildPhase::Signing;

/// Signs the packaged APK into the project's output path with the
/// configured key, or a freshly generated one.
pub struct SignApkTask;

impl Task for SignApkTask {
    fn name(&self) -> &'static str {
        "sign-apk"
    }

    fn phase(&self) -> BuildPhase {
        PHASE
    }

    fn execute(&self, session: &BuildSession) -> Result<(), BuildError> {
        session.check_cancelled(PHASE)?;
        let unsigned = session
            .get(UNSIGNED_APK)
            .ok_or_else(|| BuildError::new(PHASE, "no packaged APK to sign"))?;
        let key = match &session.config().signing.private_key {
            Some(hex) => SigningKeyPair::from_hex(hex).map_err(|error| {
                BuildError::new(PHASE, "configured signing key is invalid").with_source(error)
            })?,
            None => {
                session.log("no signing key configured; generating a new key pair");
                SigningKeyPair::generate()
            }
        };

        let output = session.project().output_apk_path();
        let summary = sign_apk(&unsigned, &output, &key)
            .map_err(|error| BuildError::new(PHASE, "could not sign the APK").with_source(error))?;
        session.log(format!(
            "signed {} entries with key {}",
            summary.entries_signed, summary.public_key_hex
        ));
        session.put(SIGNED_APK, summary.output);
        Ok(())
    }
}
