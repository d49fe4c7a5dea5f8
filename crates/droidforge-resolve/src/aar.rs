//! Android library bundles: only `classes.jar` and `jni/<abi>/*.so` are
//! taken out.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::ResolveError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AarContents {
    pub classes_jar: Option<PathBuf>,
    /// Directory holding `<abi>/lib*.so`, when the bundle ships native code.
    pub native_dir: Option<PathBuf>,
}

fn is_safe(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && !name.starts_with('\\')
        && Path::new(name)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

pub fn unpack_aar(aar: &Path, dest: &Path) -> Result<AarContents, ResolveError> {
    let archive_error = |reason: String| ResolveError::Archive {
        path: aar.display().to_string(),
        reason,
    };
    let file = fs::File::open(aar).map_err(|error| ResolveError::io(aar, error))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|error| archive_error(error.to_string()))?;
    fs::create_dir_all(dest).map_err(|error| ResolveError::io(dest, error))?;

    let mut contents = AarContents::default();
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|error| archive_error(error.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if !is_safe(&name) {
            warn!(entry = %name, aar = %aar.display(), "skipping unsafe aar entry");
            continue;
        }
        let target = if name == "classes.jar" {
            dest.join("classes.jar")
        } else if name.starts_with("jni/") && name.ends_with(".so") && name.matches('/').count() == 2 {
            dest.join(&name)
        } else {
            continue;
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|error| ResolveError::io(parent, error))?;
        }
        let mut output = fs::File::create(&target).map_err(|error| ResolveError::io(&target, error))?;
        io::copy(&mut entry, &mut output).map_err(|error| ResolveError::io(&target, error))?;
        if name == "classes.jar" {
            contents.classes_jar = Some(target);
        } else {
            contents.native_dir = Some(dest.join("jni"));
        }
    }
    Ok(contents)
}

/// Reads back a previously unpacked bundle.
pub fn unpacked_contents(dest: &Path) -> AarContents {
    let classes = dest.join("classes.jar");
    let jni = dest.join("jni");
    AarContents {
        classes_jar: classes.is_file().then_some(classes),
        native_dir: jni.is_dir().then_some(jni),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_aar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).expect("create");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::<()>::default();
        for (name, body) in entries {
            writer.start_file(*name, options).expect("start");
            writer.write_all(body).expect("write");
        }
        writer.finish().expect("finish");
    }

    #[test]
    fn extracts_classes_and_native_libs_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aar = dir.path().join("lib.aar");
        write_aar(
            &aar,
            &[
                ("AndroidManifest.xml", b"<manifest/>"),
                ("classes.jar", b"PK\x03\x04"),
                ("jni/arm64-v8a/libfoo.so", b"\x7fELF"),
                ("jni/x86/nested/libbar.so", b"\x7fELF"),
                ("res/values/values.xml", b"<resources/>"),
            ],
        );
        let dest = dir.path().join("unpacked");
        let contents = unpack_aar(&aar, &dest).expect("unpack");
        assert_eq!(contents.classes_jar, Some(dest.join("classes.jar")));
        assert_eq!(contents.native_dir, Some(dest.join("jni")));
        assert!(dest.join("jni/arm64-v8a/libfoo.so").is_file());
        assert!(!dest.join("jni/x86/nested/libbar.so").exists());
        assert!(!dest.join("AndroidManifest.xml").exists());
        assert_eq!(unpacked_contents(&dest), contents);
    }

    #[test]
    fn unsafe_names_are_rejected() {
        assert!(is_safe("classes.jar"));
        assert!(!is_safe("../classes.jar"));
        assert!(!is_safe("/classes.jar"));
        assert!(!is_safe("jni/../../x.so"));
    }
}
