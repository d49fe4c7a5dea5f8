//! APK assembly and signing.

pub mod apk;
pub mod archive;
pub mod error;
pub mod signing;

pub use apk::{dex_entry_name, ApkBuilder, ApkSummary};
pub use error::PackError;
pub use signing::{sign_apk, verify_apk, SignError, SignSummary, SigningKeyPair, VerifyReport};
