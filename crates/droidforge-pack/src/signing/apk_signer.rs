use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::keys::{parse_public_key_hex, verify, SignError, SigningKeyPair};
use super::manifest::{
    build_manifest, build_signature_file, digest_base64, parse_sections, write_attribute,
    DIGEST_ATTRIBUTE, MANIFEST_DIGEST_ATTRIBUTE, MANIFEST_PATH, SIGNATURE_BLOCK_PATH,
    SIGNATURE_FILE_PATH,
};
use crate::archive::entry_options;

const CREATED_BY: &str = concat!("droidforge ", env!("CARGO_PKG_VERSION"));
const ALGORITHM: &str = "Ed25519";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignSummary {
    pub output: PathBuf,
    pub entries_signed: usize,
    pub public_key_hex: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyReport {
    pub entries_checked: usize,
    pub public_key_hex: String,
}

/// Signature files from any earlier signing pass; they are never carried over.
pub fn is_signature_metadata(name: &str) -> bool {
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if file.contains('/') {
        return false;
    }
    let upper = file.to_ascii_uppercase();
    upper == "MANIFEST.MF"
        || [".SF", ".RSA", ".DSA", ".EC", ".ED25519"]
            .iter()
            .any(|suffix| upper.ends_with(suffix))
}

fn io_error(path: &Path, error: impl ToString) -> SignError {
    SignError::Io {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}

fn zip_error(path: &Path, error: impl ToString) -> SignError {
    SignError::Zip {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<fs::File>, SignError> {
    let file = fs::File::open(path).map_err(|error| io_error(path, error))?;
    zip::ZipArchive::new(file).map_err(|error| zip_error(path, error))
}

fn read_entry(
    archive: &mut zip::ZipArchive<fs::File>,
    path: &Path,
    index: usize,
) -> Result<Vec<u8>, SignError> {
    let mut entry = archive
        .by_index(index)
        .map_err(|error| zip_error(path, error))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|error| io_error(path, error))?;
    Ok(bytes)
}

fn read_named(
    archive: &mut zip::ZipArchive<fs::File>,
    path: &Path,
    name: &str,
) -> Result<Option<String>, SignError> {
    let Some(index) = archive.index_for_name(name) else {
        return Ok(None);
    };
    let bytes = read_entry(archive, path, index)?;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| SignError::Manifest(format!("'{}' is not valid UTF-8", name)))
}

/// Signs `input` into `output` (which may be the same file). Every entry
/// other than old signature files is copied without recompression.
pub fn sign_apk(input: &Path, output: &Path, key: &SigningKeyPair) -> Result<SignSummary, SignError> {
    let mut archive = open_archive(input)?;

    let mut kept = Vec::new();
    let mut digests = Vec::new();
    for index in 0..archive.len() {
        let name = archive
            .by_index_raw(index)
            .map_err(|error| zip_error(input, error))?
            .name()
            .to_string();
        if name.ends_with('/') || is_signature_metadata(&name) {
            continue;
        }
        let bytes = read_entry(&mut archive, input, index)?;
        digests.push((name, digest_base64(&bytes)));
        kept.push(index);
    }
    digests.sort();

    let manifest = build_manifest(CREATED_BY, &digests);
    let manifest_text = manifest.render();
    let signature_file = build_signature_file(CREATED_BY, &manifest);
    let signature = key.sign(&Sha256::digest(signature_file.as_bytes()));
    let mut block = String::new();
    write_attribute(&mut block, "Algorithm", ALGORITHM);
    write_attribute(&mut block, "Public-Key", &key.public_key_hex());
    write_attribute(&mut block, "Digest", "SHA-256");
    write_attribute(&mut block, "Signature", &STANDARD.encode(signature));

    let staging = staging_path(output);
    let result = write_signed(
        &mut archive,
        input,
        &staging,
        &kept,
        [
            (MANIFEST_PATH, manifest_text.as_bytes()),
            (SIGNATURE_FILE_PATH, signature_file.as_bytes()),
            (SIGNATURE_BLOCK_PATH, block.as_bytes()),
        ],
    );
    if let Err(error) = result {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    drop(archive);
    fs::rename(&staging, output).map_err(|error| io_error(output, error))?;

    info!(
        apk = %output.display(),
        entries = digests.len(),
        public_key = %key.public_key_hex(),
        "apk signed"
    );
    Ok(SignSummary {
        output: output.to_path_buf(),
        entries_signed: digests.len(),
        public_key_hex: key.public_key_hex(),
    })
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".signing");
    output.with_file_name(name)
}

fn write_signed(
    archive: &mut zip::ZipArchive<fs::File>,
    input: &Path,
    staging: &Path,
    kept: &[usize],
    metadata: [(&str, &[u8]); 3],
) -> Result<(), SignError> {
    if let Some(parent) = staging.parent() {
        fs::create_dir_all(parent).map_err(|error| io_error(parent, error))?;
    }
    let file = fs::File::create(staging).map_err(|error| io_error(staging, error))?;
    let mut writer = zip::ZipWriter::new(file);

    for (name, bytes) in metadata {
        let options = entry_options(name).map_err(|error| zip_error(staging, error))?;
        writer
            .start_file(name, options)
            .map_err(|error| zip_error(staging, error))?;
        writer
            .write_all(bytes)
            .map_err(|error| io_error(staging, error))?;
    }
    for &index in kept {
        let entry = archive
            .by_index_raw(index)
            .map_err(|error| zip_error(input, error))?;
        debug!(entry = entry.name(), "copying signed entry");
        writer
            .raw_copy_file(entry)
            .map_err(|error| zip_error(staging, error))?;
    }
    writer.finish().map_err(|error| zip_error(staging, error))?;
    Ok(())
}

/// Checks every entry digest, the signature file against the manifest and
/// the Ed25519 signature over the signature file.
pub fn verify_apk(path: &Path) -> Result<VerifyReport, SignError> {
    let mut archive = open_archive(path)?;
    let manifest_text = read_named(&mut archive, path, MANIFEST_PATH)?.ok_or(SignError::Unsigned)?;
    let signature_file =
        read_named(&mut archive, path, SIGNATURE_FILE_PATH)?.ok_or(SignError::Unsigned)?;
    let block_text =
        read_named(&mut archive, path, SIGNATURE_BLOCK_PATH)?.ok_or(SignError::Unsigned)?;

    let block = parse_sections(&block_text)?
        .into_iter()
        .next()
        .ok_or_else(|| SignError::Manifest("empty signature block".into()))?;
    if block.get("Algorithm") != Some(ALGORITHM) {
        return Err(SignError::Manifest("unsupported signature algorithm".into()));
    }
    let public_key_hex = block
        .get("Public-Key")
        .ok_or_else(|| SignError::Manifest("signature block has no public key".into()))?
        .to_string();
    let public_key = parse_public_key_hex(&public_key_hex)?;
    let signature = STANDARD
        .decode(
            block
                .get("Signature")
                .ok_or_else(|| SignError::Manifest("signature block has no signature".into()))?,
        )
        .map_err(|error| SignError::Manifest(format!("signature is not base64: {}", error)))?;
    if !verify(&public_key, &Sha256::digest(signature_file.as_bytes()), &signature)? {
        return Err(SignError::SignatureInvalid);
    }

    let manifest_sections = parse_sections(&manifest_text)?;
    let sf_sections = parse_sections(&signature_file)?;
    let sf_main = sf_sections
        .first()
        .ok_or_else(|| SignError::Manifest("empty signature file".into()))?;
    if sf_main.get(MANIFEST_DIGEST_ATTRIBUTE) != Some(digest_base64(manifest_text.as_bytes()).as_str()) {
        return Err(SignError::DigestMismatch(MANIFEST_PATH.to_string()));
    }

    let mut section_text = BTreeMap::new();
    let mut expected = BTreeMap::new();
    for section in manifest_sections.iter().skip(1) {
        let name = section
            .name()
            .ok_or_else(|| SignError::Manifest("manifest section without a name".into()))?;
        let digest = section
            .get(DIGEST_ATTRIBUTE)
            .ok_or_else(|| SignError::Manifest(format!("no digest for '{}'", name)))?;
        section_text.insert(name.to_string(), section.raw.as_str());
        expected.insert(name.to_string(), digest.to_string());
    }
    for section in sf_sections.iter().skip(1) {
        let name = section
            .name()
            .ok_or_else(|| SignError::Manifest("signature section without a name".into()))?;
        let raw = section_text
            .get(name)
            .ok_or_else(|| SignError::DigestMismatch(name.to_string()))?;
        if section.get(DIGEST_ATTRIBUTE) != Some(digest_base64(raw.as_bytes()).as_str()) {
            return Err(SignError::DigestMismatch(name.to_string()));
        }
    }

    let mut checked = 0;
    for index in 0..archive.len() {
        let name = archive
            .by_index_raw(index)
            .map_err(|error| zip_error(path, error))?
            .name()
            .to_string();
        if name.ends_with('/') || is_signature_metadata(&name) {
            continue;
        }
        let digest = expected
            .remove(&name)
            .ok_or_else(|| SignError::DigestMismatch(name.clone()))?;
        let bytes = read_entry(&mut archive, path, index)?;
        if digest_base64(&bytes) != digest {
            return Err(SignError::DigestMismatch(name));
        }
        checked += 1;
    }
    if let Some((missing, _)) = expected.into_iter().next() {
        return Err(SignError::DigestMismatch(missing));
    }

    Ok(VerifyReport {
        entries_checked: checked,
        public_key_hex,
    })
}
