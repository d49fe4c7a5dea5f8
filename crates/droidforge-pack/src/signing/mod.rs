mod apk_signer;
mod keys;
pub mod manifest;

pub use apk_signer::{is_signature_metadata, sign_apk, verify_apk, SignSummary, VerifyReport};
pub use keys::{parse_private_key_hex, parse_public_key_hex, verify, SignError, SigningKeyPair};
