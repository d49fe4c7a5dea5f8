//! JAR-style `MANIFEST.MF` and `CERT.SF` text.
//!
//! Lines end in CRLF and are wrapped at 72 bytes; continuation lines start
//! with a single space. Every section, the main one included, ends with an
//! empty line.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use super::keys::SignError;

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const SIGNATURE_FILE_PATH: &str = "META-INF/CERT.SF";
pub const SIGNATURE_BLOCK_PATH: &str = "META-INF/CERT.ED25519";

pub const DIGEST_ATTRIBUTE: &str = "SHA-256-Digest";
pub const MANIFEST_DIGEST_ATTRIBUTE: &str = "SHA-256-Digest-Manifest";
pub const MAIN_ATTRIBUTES_DIGEST_ATTRIBUTE: &str = "SHA-256-Digest-Manifest-Main-Attributes";

const MAX_LINE_BYTES: usize = 72;

pub fn digest_base64(bytes: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(bytes))
}

/// Appends `key: value` wrapped to 72 bytes, never splitting a UTF-8 char.
pub fn write_attribute(out: &mut String, key: &str, value: &str) {
    let line = format!("{}: {}", key, value);
    let mut budget = MAX_LINE_BYTES;
    let mut used = 0;
    for ch in line.chars() {
        if used + ch.len_utf8() > budget {
            out.push_str("\r\n ");
            budget = MAX_LINE_BYTES - 1;
            used = 0;
        }
        out.push(ch);
        used += ch.len_utf8();
    }
    out.push_str("\r\n");
}

/// A rendered manifest together with the text of each of its sections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestText {
    pub main_section: String,
    pub entry_sections: Vec<(String, String)>,
}

impl ManifestText {
    pub fn render(&self) -> String {
        let mut text = self.main_section.clone();
        for (_, section) in &self.entry_sections {
            text.push_str(section);
        }
        text
    }
}

/// `digests` pairs archive paths with base64 SHA-256 digests of their bytes.
pub fn build_manifest(created_by: &str, digests: &[(String, String)]) -> ManifestText {
    let mut main_section = String::new();
    write_attribute(&mut main_section, "Manifest-Version", "1.0");
    write_attribute(&mut main_section, "Created-By", created_by);
    main_section.push_str("\r\n");

    let entry_sections = digests
        .iter()
        .map(|(name, digest)| {
            let mut section = String::new();
            write_attribute(&mut section, "Name", name);
            write_attribute(&mut section, DIGEST_ATTRIBUTE, digest);
            section.push_str("\r\n");
            (name.clone(), section)
        })
        .collect();

    ManifestText {
        main_section,
        entry_sections,
    }
}

pub fn build_signature_file(created_by: &str, manifest: &ManifestText) -> String {
    let mut text = String::new();
    write_attribute(&mut text, "Signature-Version", "1.0");
    write_attribute(&mut text, "Created-By", created_by);
    write_attribute(
        &mut text,
        MANIFEST_DIGEST_ATTRIBUTE,
        &digest_base64(manifest.render().as_bytes()),
    );
    write_attribute(
        &mut text,
        MAIN_ATTRIBUTES_DIGEST_ATTRIBUTE,
        &digest_base64(manifest.main_section.as_bytes()),
    );
    text.push_str("\r\n");
    for (name, section) in &manifest.entry_sections {
        write_attribute(&mut text, "Name", name);
        write_attribute(&mut text, DIGEST_ATTRIBUTE, &digest_base64(section.as_bytes()));
        text.push_str("\r\n");
    }
    text
}

/// One parsed section: its exact source text and its unwrapped attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub raw: String,
    pub attributes: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.get("Name")
    }
}

/// Splits manifest-style text into sections, keeping each section's raw
/// bytes (including the terminating blank line) for digest checks.
pub fn parse_sections(text: &str) -> Result<Vec<Section>, SignError> {
    let mut sections = Vec::new();
    let mut raw = String::new();
    let mut lines: Vec<String> = Vec::new();

    for line in text.split_inclusive('\n') {
        raw.push_str(line);
        let content = line.trim_end_matches('\n').trim_end_matches('\r');
        if content.is_empty() {
            if !lines.is_empty() {
                sections.push(finish_section(std::mem::take(&mut raw), &lines)?);
                lines.clear();
            } else {
                raw.clear();
            }
            continue;
        }
        if let Some(continuation) = content.strip_prefix(' ') {
            let last = lines
                .last_mut()
                .ok_or_else(|| SignError::Manifest("continuation before any attribute".into()))?;
            last.push_str(continuation);
        } else {
            lines.push(content.to_string());
        }
    }
    if !lines.is_empty() {
        sections.push(finish_section(raw, &lines)?);
    }
    Ok(sections)
}

fn finish_section(raw: String, lines: &[String]) -> Result<Section, SignError> {
    let attributes = lines
        .iter()
        .map(|line| {
            line.split_once(": ")
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| SignError::Manifest(format!("malformed attribute line '{}'", line)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Section { raw, attributes })
}
