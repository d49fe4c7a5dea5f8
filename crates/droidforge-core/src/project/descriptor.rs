//! `project.properties` parsing: `key=value` or `key: value` lines with `#`
//! comments.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

fn entry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*[=:]\s*(.*?)\s*$")
            .unwrap_or_else(|error| panic!("descriptor pattern is invalid: {error}"))
    })
}

/// Raw key/value view of a project descriptor. Later keys win.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Descriptor {
    entries: BTreeMap<String, String>,
}

impl Descriptor {
    pub fn parse(contents: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                continue;
            }
            if let Some(captures) = entry_pattern().captures(line) {
                let value = strip_quotes(&captures[2]);
                entries.insert(captures[1].to_string(), value.to_string());
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, String> {
        match self.get(key) {
            Some(value) => value
                .parse::<u32>()
                .map(Some)
                .map_err(|_| format!("'{}' is not a non-negative integer", value)),
            None => Ok(None),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, String> {
        match self.get(key).map(|value| value.to_ascii_lowercase()) {
            Some(value) => match value.as_str() {
                "true" | "yes" | "1" => Ok(Some(true)),
                "false" | "no" | "0" => Ok(Some(false)),
                _ => Err(format!("'{}' is not a boolean", value)),
            },
            None => Ok(None),
        }
    }

    /// Comma separated list; blank items are dropped.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_separators_and_skips_comments() {
        let descriptor = Descriptor::parse(
            "# app\nname = Demo\npackage: com.example.demo\n\n  minSdk=24\nversionName = \"1.2\"\nbroken line\n",
        );
        assert_eq!(descriptor.get("name"), Some("Demo"));
        assert_eq!(descriptor.get("package"), Some("com.example.demo"));
        assert_eq!(descriptor.get_u32("minSdk"), Ok(Some(24)));
        assert_eq!(descriptor.get("versionName"), Some("1.2"));
        assert_eq!(descriptor.get("broken line"), None);
    }

    #[test]
    fn typed_accessors_report_bad_values() {
        let descriptor = Descriptor::parse("minSdk=abc\ndebug=maybe\nabis= arm64-v8a, ,x86 \n");
        assert!(descriptor.get_u32("minSdk").is_err());
        assert!(descriptor.get_bool("debug").is_err());
        assert_eq!(
            descriptor.get_list("abis"),
            Some(vec!["arm64-v8a".to_string(), "x86".to_string()])
        );
        assert_eq!(descriptor.get_bool("native"), Ok(None));
    }

    #[test]
    fn empty_values_read_as_absent() {
        let descriptor = Descriptor::parse("mainActivity=\n");
        assert_eq!(descriptor.get("mainActivity"), None);
    }
}
