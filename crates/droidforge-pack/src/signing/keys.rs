use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("invalid hex string")]
    InvalidHex,
    #[error("public key must be 32 bytes, got {len}")]
    InvalidPublicKeyLength { len: usize },
    #[error("private key must be 64 bytes, got {len}")]
    InvalidPrivateKeyLength { len: usize },
    #[error("signature must be 64 bytes, got {len}")]
    InvalidSignatureLength { len: usize },
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("private key does not match its embedded public key")]
    KeyMismatch,
    #[error("io error at '{path}': {reason}")]
    Io { path: String, reason: String },
    #[error("zip error in '{path}': {reason}")]
    Zip { path: String, reason: String },
    #[error("malformed signature metadata: {0}")]
    Manifest(String),
    #[error("digest mismatch for '{0}'")]
    DigestMismatch(String),
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("archive is not signed")]
    Unsigned,
}

pub fn parse_public_key_hex(hex: &str) -> Result<[u8; 32], SignError> {
    let bytes = hex::decode(hex.trim()).map_err(|_| SignError::InvalidHex)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| SignError::InvalidPublicKeyLength { len })
}

pub fn parse_private_key_hex(hex: &str) -> Result<[u8; 64], SignError> {
    let bytes = hex::decode(hex.trim()).map_err(|_| SignError::InvalidHex)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| SignError::InvalidPrivateKeyLength { len })
}

/// Ed25519 keypair stored as 64 bytes: secret followed by public.
#[derive(Clone)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        let mut rng = OsRng;
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    pub fn from_bytes(keypair: &[u8; 64]) -> Result<Self, SignError> {
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&keypair[0..32]);
        let signing_key = SigningKey::from_bytes(&secret);
        if signing_key.verifying_key().to_bytes()[..] != keypair[32..64] {
            return Err(SignError::KeyMismatch);
        }
        Ok(Self { signing_key })
    }

    pub fn from_hex(hex: &str) -> Result<Self, SignError> {
        Self::from_bytes(&parse_private_key_hex(hex)?)
    }

    /// Deterministic key for debug builds when no key is configured.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn to_hex(&self) -> String {
        let mut keypair = [0u8; 64];
        keypair[0..32].copy_from_slice(&self.signing_key.to_bytes());
        keypair[32..64].copy_from_slice(&self.public_key());
        hex::encode(keypair)
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(payload);
        signature.to_bytes().to_vec()
    }
}

pub fn verify(public_key: &[u8; 32], payload: &[u8], signature: &[u8]) -> Result<bool, SignError> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key).map_err(|_| SignError::InvalidPublicKey)?;
    let len = signature.len();
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| SignError::InvalidSignatureLength { len })?;
    let signature = Signature::from_bytes(&sig_bytes);
    Ok(verifying_key.verify(payload, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let pair = SigningKeyPair::from_seed([7u8; 32]);
        let signature = pair.sign(b"hello");
        assert!(verify(&pair.public_key(), b"hello", &signature).expect("verify"));
        assert!(!verify(&pair.public_key(), b"hellp", &signature).expect("verify"));
    }

    #[test]
    fn hex_keypair_reloads() {
        let pair = SigningKeyPair::generate();
        let reloaded = SigningKeyPair::from_hex(&pair.to_hex()).expect("reload");
        assert_eq!(reloaded.public_key(), pair.public_key());
    }

    #[test]
    fn invalid_key_lengths() {
        assert!(matches!(
            parse_public_key_hex("aa"),
            Err(SignError::InvalidPublicKeyLength { len: 1 })
        ));
        assert!(matches!(
            parse_private_key_hex("zz"),
            Err(SignError::InvalidHex)
        ));
        assert!(matches!(
            SigningKeyPair::from_hex(&"11".repeat(64)),
            Err(SignError::KeyMismatch)
        ));
    }
}
