use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use droidforge_core::{Abi, Dependency, ForgeConfig, ProjectConfig};

fn temp_dir(name: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("droidforge-core-{}-{}", name, stamp));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn project_and_forge_config_load_together() {
    let dir = temp_dir("project");
    std::fs::write(
        dir.join("project.properties"),
        "name: Calculator\npackage: com.example.calc\ntargetSdk: 33\nabis: armeabi-v7a\n",
    )
    .expect("write descriptor");
    std::fs::write(
        dir.join("droidforge.yaml"),
        "resolver:\n  repositories:\n    - file:///opt/m2\n  workers: 1\n",
    )
    .expect("write config");

    let project = ProjectConfig::load(&dir).expect("project");
    let forge = ForgeConfig::load(&dir).expect("forge config");

    assert_eq!(project.target_sdk(), 33);
    assert_eq!(project.abis(), &[Abi::ArmeabiV7a]);
    assert_eq!(project.layout().res_dir, dir.join("src/main/res"));
    assert_eq!(forge.resolver.repositories, vec!["file:///opt/m2"]);
    assert_eq!(forge.resolver.workers, 1);

    let dependency: Dependency = "androidx.core:core:1.12.0".parse().expect("coordinate");
    assert_eq!(
        dependency.remote_path("aar"),
        "androidx/core/core/1.12.0/core-1.12.0.aar"
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_descriptor_is_reported() {
    let dir = temp_dir("missing");
    let error = ProjectConfig::load(&dir).expect_err("no descriptor");
    assert!(error.to_string().contains("project.properties"));
    std::fs::remove_dir_all(&dir).ok();
}
