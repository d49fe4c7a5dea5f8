use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use droidforge_core::abi::Abi;
use droidforge_pack::{sign_apk, verify_apk, ApkBuilder, SignError, SigningKeyPair};
use zip::write::FileOptions;
use zip::CompressionMethod;

fn write_resource_apk(path: &Path) {
    let file = fs::File::create(path).expect("create resource apk");
    let mut writer = zip::ZipWriter::new(file);
    let deflated = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    writer
        .start_file("AndroidManifest.xml", deflated)
        .expect("start manifest");
    writer.write_all(b"<manifest/>").expect("write manifest");
    writer
        .start_file("resources.arsc", deflated)
        .expect("start arsc");
    writer.write_all(&[3u8; 512]).expect("write arsc");
    writer
        .start_file("res/layout/main.xml", deflated)
        .expect("start layout");
    writer.write_all(b"<LinearLayout/>").expect("write layout");
    writer.finish().expect("finish");
}

fn entry_names(path: &Path) -> Vec<String> {
    let file = fs::File::open(path).expect("open");
    let archive = zip::ZipArchive::new(file).expect("zip");
    archive.file_names().map(str::to_string).collect()
}

fn raw_entry(path: &Path, name: &str) -> (CompressionMethod, u32, Vec<u8>) {
    let file = fs::File::open(path).expect("open");
    let mut archive = zip::ZipArchive::new(file).expect("zip");
    let index = archive.index_for_name(name).expect("entry");
    let mut entry = archive.by_index_raw(index).expect("entry");
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).expect("read");
    (entry.compression(), entry.crc32(), bytes)
}

fn build_unsigned(dir: &Path) -> PathBuf {
    let resource_apk = dir.join("resources.ap_");
    write_resource_apk(&resource_apk);
    let dex = dir.join("classes.dex");
    fs::write(&dex, b"dex\n035\0payload").expect("dex");
    let native = dir.join("native");
    fs::create_dir_all(native.join("arm64-v8a")).expect("abi dir");
    fs::create_dir_all(native.join("x86")).expect("abi dir");
    fs::create_dir_all(native.join("unknown")).expect("abi dir");
    fs::write(native.join("arm64-v8a/libapp.so"), [1u8; 64]).expect("so");
    fs::write(native.join("x86/libapp.so"), [2u8; 64]).expect("so");
    fs::write(native.join("unknown/libapp.so"), [9u8; 64]).expect("so");

    let output = dir.join("out/app-unsigned.apk");
    let summary = ApkBuilder::new()
        .resource_apk(&resource_apk)
        .dex_files(vec![dex])
        .native_dir(&native)
        .abis(vec![Abi::Arm64V8a, Abi::X86])
        .write(&output)
        .expect("write apk");
    assert_eq!(summary.dex_count, 1);
    assert_eq!(summary.native_libs, 2);
    output
}

#[test]
fn assembled_apk_has_expected_layout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let apk = build_unsigned(dir.path());
    let names = entry_names(&apk);
    for expected in [
        "AndroidManifest.xml",
        "resources.arsc",
        "res/layout/main.xml",
        "classes.dex",
        "lib/arm64-v8a/libapp.so",
        "lib/x86/libapp.so",
    ] {
        assert!(names.iter().any(|name| name == expected), "missing {}", expected);
    }
    assert!(!names.iter().any(|name| name.contains("unknown")));

    let (method, _, _) = raw_entry(&apk, "resources.arsc");
    assert_eq!(method, CompressionMethod::Stored);
    let (method, _, _) = raw_entry(&apk, "lib/x86/libapp.so");
    assert_eq!(method, CompressionMethod::Stored);
}

#[test]
fn signing_preserves_entries_and_verifies() {
    let dir = tempfile::tempdir().expect("tempdir");
    let unsigned = build_unsigned(dir.path());
    let signed = dir.path().join("out/app.apk");
    let key = SigningKeyPair::from_seed([5u8; 32]);

    let summary = sign_apk(&unsigned, &signed, &key).expect("sign");
    assert_eq!(summary.entries_signed, 6);

    let names = entry_names(&signed);
    assert_eq!(names[0], "META-INF/MANIFEST.MF");
    assert_eq!(names[1], "META-INF/CERT.SF");
    assert_eq!(names[2], "META-INF/CERT.ED25519");

    for name in entry_names(&unsigned) {
        assert_eq!(raw_entry(&unsigned, &name), raw_entry(&signed, &name), "{}", name);
    }

    let report = verify_apk(&signed).expect("verify");
    assert_eq!(report.entries_checked, 6);
    assert_eq!(report.public_key_hex, key.public_key_hex());
}

#[test]
fn resigning_in_place_replaces_old_signature() {
    let dir = tempfile::tempdir().expect("tempdir");
    let apk = build_unsigned(dir.path());
    sign_apk(&apk, &apk, &SigningKeyPair::from_seed([1u8; 32])).expect("first sign");
    let second = SigningKeyPair::from_seed([2u8; 32]);
    sign_apk(&apk, &apk, &second).expect("second sign");

    let names = entry_names(&apk);
    assert_eq!(
        names.iter().filter(|name| name.starts_with("META-INF/")).count(),
        3
    );
    let report = verify_apk(&apk).expect("verify");
    assert_eq!(report.public_key_hex, second.public_key_hex());
}

#[test]
fn tampered_entry_fails_verification() {
    let dir = tempfile::tempdir().expect("tempdir");
    let unsigned = build_unsigned(dir.path());
    let signed = dir.path().join("signed.apk");
    sign_apk(&unsigned, &signed, &SigningKeyPair::generate()).expect("sign");

    let tampered = dir.path().join("tampered.apk");
    let mut source = zip::ZipArchive::new(fs::File::open(&signed).expect("open")).expect("zip");
    let mut writer = zip::ZipWriter::new(fs::File::create(&tampered).expect("create"));
    for index in 0..source.len() {
        let entry = source.by_index_raw(index).expect("entry");
        if entry.name() == "classes.dex" {
            drop(entry);
            writer
                .start_file("classes.dex", FileOptions::<()>::default())
                .expect("start");
            writer.write_all(b"evil").expect("write");
        } else {
            writer.raw_copy_file(entry).expect("copy");
        }
    }
    writer.finish().expect("finish");

    assert!(matches!(
        verify_apk(&tampered),
        Err(SignError::DigestMismatch(name)) if name == "classes.dex"
    ));
}

#[test]
fn unsigned_apk_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let unsigned = build_unsigned(dir.path());
    assert!(matches!(verify_apk(&unsigned), Err(SignError::Unsigned)));
}
