//! Typed slots tasks use to hand results to later tasks.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Mutex;

/// String key bound to the type stored under it.
pub struct ArtifactKey<T> {
    name: &'static str,
    marker: PhantomData<fn() -> T>,
}

impl<T> ArtifactKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ArtifactKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArtifactKey<T> {}

pub const RESOLVED_CLASSPATH: ArtifactKey<Vec<PathBuf>> = ArtifactKey::new("resolved.classpath");
pub const RESOLVED_NATIVE_DIRS: ArtifactKey<Vec<PathBuf>> = ArtifactKey::new("resolved.native_dirs");
pub const RESOURCE_APK: ArtifactKey<PathBuf> = ArtifactKey::new("resources.apk");
pub const GENERATED_SOURCES: ArtifactKey<PathBuf> = ArtifactKey::new("resources.generated_dir");
pub const NATIVE_LIBS_DIR: ArtifactKey<PathBuf> = ArtifactKey::new("native.libs_dir");
pub const KOTLIN_CLASSES: ArtifactKey<PathBuf> = ArtifactKey::new("kotlin.classes_dir");
pub const KOTLIN_RECOMPILED: ArtifactKey<bool> = ArtifactKey::new("kotlin.recompiled");
pub const JAVA_CLASSES: ArtifactKey<PathBuf> = ArtifactKey::new("java.classes_dir");
pub const CLASSES_JAR: ArtifactKey<PathBuf> = ArtifactKey::new("dex.classes_jar");
pub const DEX_FILES: ArtifactKey<Vec<PathBuf>> = ArtifactKey::new("dex.files");
pub const UNSIGNED_APK: ArtifactKey<PathBuf> = ArtifactKey::new("package.unsigned_apk");
pub const SIGNED_APK: ArtifactKey<PathBuf> = ArtifactKey::new("sign.apk");

#[derive(Default)]
pub struct ArtifactStore {
    slots: Mutex<HashMap<&'static str, Box<dyn Any + Send + Sync>>>,
}

impl ArtifactStore {
    pub fn put<T: Any + Send + Sync>(&self, key: ArtifactKey<T>, value: T) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.insert(key.name, Box::new(value));
    }

    pub fn get<T: Any + Clone>(&self, key: ArtifactKey<T>) -> Option<T> {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<_> = slots.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_round_trip_by_key() {
        let store = ArtifactStore::default();
        store.put(DEX_FILES, vec![PathBuf::from("classes.dex")]);
        store.put(RESOURCE_APK, PathBuf::from("res.ap_"));
        assert_eq!(store.get(DEX_FILES), Some(vec![PathBuf::from("classes.dex")]));
        assert_eq!(store.get(RESOURCE_APK), Some(PathBuf::from("res.ap_")));
        assert!(store.get(SIGNED_APK).is_none());
        assert_eq!(store.names(), vec!["dex.files", "resources.apk"]);
    }

    #[test]
    fn later_put_replaces_value() {
        let store = ArtifactStore::default();
        store.put(DEX_FILES, vec![PathBuf::from("a.dex"), PathBuf::from("b.dex")]);
        store.put(DEX_FILES, vec![PathBuf::from("small.dex")]);
        assert_eq!(store.get(DEX_FILES).map(|files| files.len()), Some(1));
    }
}
