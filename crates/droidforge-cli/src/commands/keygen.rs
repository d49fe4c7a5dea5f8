use droidforge_pack::SigningKeyPair;

pub struct KeygenOutput {
    pub public_key_hex: String,
    pub private_key_hex: String,
}

pub fn run() -> Result<KeygenOutput, String> {
    let key = SigningKeyPair::generate();
    Ok(KeygenOutput {
        public_key_hex: key.public_key_hex(),
        private_key_hex: key.to_hex(),
    })
}
