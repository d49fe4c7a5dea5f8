use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use droidforge_core::ProjectConfig;

const FINGERPRINT_VERSION: &str = "c1";

/// Canonical JSON of the configuration fields that force a full rebuild when
/// they change.
pub fn canonical_config_json(config: &ProjectConfig) -> serde_json::Result<String> {
    let mut fields = BTreeMap::new();
    fields.insert(
        "package".to_string(),
        Value::String(config.package().to_string()),
    );
    fields.insert("min_sdk".to_string(), Value::from(config.min_sdk()));
    fields.insert("target_sdk".to_string(), Value::from(config.target_sdk()));
    fields.insert("debug".to_string(), Value::Bool(config.is_debug()));

    let mut root = BTreeMap::new();
    root.insert(
        "version".to_string(),
        Value::String(FINGERPRINT_VERSION.to_string()),
    );
    root.insert(
        "config".to_string(),
        Value::Object(fields.into_iter().collect()),
    );
    serde_json::to_string(&Value::Object(root.into_iter().collect()))
}

pub fn config_fingerprint(config: &ProjectConfig) -> serde_json::Result<String> {
    let json = canonical_config_json(config)?;
    Ok(format!("{}-{}", FINGERPRINT_VERSION, sha256_hex(json.as_bytes())))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(debug: bool, min_sdk: u32) -> ProjectConfig {
        ProjectConfig::builder()
            .name("Demo")
            .package("com.example.demo")
            .project_dir("/work/demo")
            .debug(debug)
            .min_sdk(min_sdk)
            .build()
            .expect("config")
    }

    #[test]
    fn canonical_json_is_sorted() {
        let json = canonical_config_json(&config(true, 24)).expect("json");
        assert_eq!(
            json,
            r#"{"config":{"debug":true,"min_sdk":24,"package":"com.example.demo","target_sdk":34},"version":"c1"}"#
        );
    }

    #[test]
    fn fingerprint_tracks_rebuild_fields() {
        let base = config_fingerprint(&config(true, 24)).expect("fingerprint");
        assert!(base.starts_with("c1-"));
        assert_eq!(base.len(), 3 + 64);
        assert_eq!(base, config_fingerprint(&config(true, 24)).expect("fingerprint"));
        assert_ne!(base, config_fingerprint(&config(false, 24)).expect("fingerprint"));
        assert_ne!(base, config_fingerprint(&config(true, 26)).expect("fingerprint"));
    }
}
