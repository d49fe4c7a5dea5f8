use std::path::{Path, PathBuf};

pub const DESCRIPTOR_FILE_NAME: &str = "project.properties";
pub const MANIFEST_FILE_NAME: &str = "AndroidManifest.xml";
pub const BUILD_DIR_NAME: &str = "build";
pub const INTERMEDIATES_DIR_NAME: &str = "intermediates";
pub const OUTPUTS_DIR_NAME: &str = "outputs";

/// Fixed source and output locations under a project directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub java_dir: PathBuf,
    pub kotlin_dir: PathBuf,
    pub res_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub manifest_path: PathBuf,
    /// `src/main/cpp` and `src/main/jni`, in lookup order.
    pub native_source_dirs: Vec<PathBuf>,
    pub jni_libs_dir: PathBuf,
    pub libs_dir: PathBuf,
    pub build_dir: PathBuf,
    pub intermediates_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: &Path) -> Self {
        let main = root.join("src").join("main");
        let build_dir = root.join(BUILD_DIR_NAME);
        Self {
            root: root.to_path_buf(),
            java_dir: main.join("java"),
            kotlin_dir: main.join("kotlin"),
            res_dir: main.join("res"),
            assets_dir: main.join("assets"),
            manifest_path: main.join(MANIFEST_FILE_NAME),
            native_source_dirs: vec![main.join("cpp"), main.join("jni")],
            jni_libs_dir: main.join("jniLibs"),
            libs_dir: root.join("libs"),
            intermediates_dir: build_dir.join(INTERMEDIATES_DIR_NAME),
            output_dir: build_dir.join(OUTPUTS_DIR_NAME).join("apk"),
            build_dir,
        }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join(DESCRIPTOR_FILE_NAME)
    }

    /// Scratch directory for one task, e.g. `build/intermediates/classes`.
    pub fn intermediate(&self, name: &str) -> PathBuf {
        self.intermediates_dir.join(name)
    }

    /// Native source directories that exist on disk.
    pub fn existing_native_dirs(&self) -> Vec<PathBuf> {
        self.native_source_dirs
            .iter()
            .filter(|dir| dir.is_dir())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_standard_locations() {
        let layout = ProjectLayout::new(Path::new("/work/app"));
        assert_eq!(layout.java_dir, Path::new("/work/app/src/main/java"));
        assert_eq!(
            layout.manifest_path,
            Path::new("/work/app/src/main/AndroidManifest.xml")
        );
        assert_eq!(layout.output_dir, Path::new("/work/app/build/outputs/apk"));
        assert_eq!(
            layout.intermediate("dex"),
            Path::new("/work/app/build/intermediates/dex")
        );
        assert_eq!(layout.descriptor_path(), Path::new("/work/app/project.properties"));
    }
}
