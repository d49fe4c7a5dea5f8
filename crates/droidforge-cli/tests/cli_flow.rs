use std::fs;
use std::io::Write;
use std::path::Path;

use droidforge_cli::commands::{build, keygen, resolve, sign, toolchain, verify};
use droidforge_toolchain::Component;

fn write_unsigned_apk(path: &Path) {
    let file = fs::File::create(path).expect("create apk");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::<()>::default();
    for (name, body) in [
        ("AndroidManifest.xml", &b"<manifest/>"[..]),
        ("classes.dex", &b"dex\n035\0"[..]),
    ] {
        writer.start_file(name, options).expect("start entry");
        writer.write_all(body).expect("write entry");
    }
    writer.finish().expect("finish apk");
}

fn write_config(project_dir: &Path, install_root: &Path) {
    fs::write(
        project_dir.join("droidforge.yaml"),
        format!(
            "toolchain:\n  install_root: {}\n  platform_sources: []\n  build_tools_sources: []\n  ndk_sources: []\n",
            install_root.display()
        ),
    )
    .expect("write droidforge.yaml");
}

#[test]
fn keygen_sign_and_verify() {
    let dir = tempfile::tempdir().expect("tempdir");
    let unsigned = dir.path().join("app-unsigned.apk");
    let signed = dir.path().join("app.apk");
    write_unsigned_apk(&unsigned);

    let keys = keygen::run().expect("keygen");
    assert_eq!(keys.public_key_hex.len(), 64);
    assert_eq!(keys.private_key_hex.len(), 128);

    let summary = sign::run(sign::SignArgs {
        apk: unsigned.clone(),
        out: Some(signed.clone()),
        private_key_hex: keys.private_key_hex.clone(),
    })
    .expect("sign");
    assert_eq!(summary.entries_signed, 2);
    assert_eq!(summary.public_key_hex, keys.public_key_hex);

    let report = verify::run(verify::VerifyArgs {
        apk: signed.clone(),
        public_key_hex: Some(keys.public_key_hex.to_uppercase()),
    })
    .expect("verify");
    assert_eq!(report.entries_checked, 2);

    let other = keygen::run().expect("second keygen");
    let mismatch = verify::run(verify::VerifyArgs {
        apk: signed,
        public_key_hex: Some(other.public_key_hex),
    });
    assert!(mismatch.is_err());

    let unsigned_check = verify::run(verify::VerifyArgs {
        apk: unsigned,
        public_key_hex: None,
    });
    assert!(unsigned_check.is_err());
}

#[test]
fn sign_rejects_a_malformed_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let apk = dir.path().join("app.apk");
    write_unsigned_apk(&apk);

    let error = sign::run(sign::SignArgs {
        apk,
        out: None,
        private_key_hex: "abcd".to_string(),
    })
    .err()
    .expect("short key must fail");
    assert!(error.contains("invalid signing key"), "{}", error);
}

#[test]
fn toolchain_status_reports_missing_components() {
    let dir = tempfile::tempdir().expect("tempdir");
    let install_root = dir.path().join("sdk");
    write_config(dir.path(), &install_root);

    let manager = toolchain::manager(dir.path()).expect("manager");
    let status = toolchain::status(&manager);
    assert_eq!(status.install_root, install_root);
    assert_eq!(status.components.len(), 3);
    assert!(status
        .components
        .iter()
        .all(|(_, state)| !state.is_installed()));
}

#[test]
fn component_names_are_parsed() {
    assert_eq!(
        toolchain::parse_components(&[]).expect("all"),
        Component::all().to_vec()
    );
    assert_eq!(
        toolchain::parse_components(&["ndk".to_string(), "platform".to_string()])
            .expect("named"),
        vec![Component::Ndk, Component::Platform]
    );
    assert!(toolchain::parse_components(&["sdk".to_string()]).is_err());
}

#[test]
fn resolve_without_declarations_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_config(dir.path(), &dir.path().join("sdk"));

    let report = resolve::run(resolve::ResolveArgs {
        project_dir: dir.path().to_path_buf(),
    })
    .expect("resolve");
    assert!(report.resolved.is_empty());
    assert!(report.failures.is_empty());
}

#[test]
fn build_requires_a_project_descriptor() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_config(dir.path(), &dir.path().join("sdk"));

    let error = build::run(build::BuildArgs {
        project_dir: dir.path().to_path_buf(),
        preset: None,
        release: false,
        quiet: true,
    })
    .err()
    .expect("no descriptor");
    assert!(error.contains("project.properties"), "{}", error);
}
