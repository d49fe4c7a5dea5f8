use std::fmt;
use std::str::FromStr;

/// Native instruction-set targets an APK can carry libraries for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Abi {
    Arm64V8a,
    ArmeabiV7a,
    X86,
    X86_64,
}

impl Abi {
    pub fn as_str(self) -> &'static str {
        self.descriptor().name
    }

    /// Triple used for the clang `--target` flag, without the API level suffix.
    pub fn target_triple(self) -> &'static str {
        self.descriptor().clang_triple
    }

    /// Triple naming the per-ABI library directory inside an NDK sysroot.
    pub fn sysroot_triple(self) -> &'static str {
        self.descriptor().sysroot_triple
    }

    pub fn is_64_bit(self) -> bool {
        self.descriptor().is_64_bit
    }

    /// Clang target with the platform level appended, e.g. `aarch64-linux-android24`.
    pub fn clang_target(self, api_level: u32) -> String {
        format!("{}{}", self.target_triple(), api_level)
    }

    pub fn descriptor(self) -> &'static AbiDescriptor {
        // registry rows are declared in variant order
        &ABI_REGISTRY[self as usize]
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Abi {
    type Err = AbiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AbiError::Empty);
        }
        registry()
            .iter()
            .find(|entry| entry.name == trimmed)
            .map(|entry| entry.abi)
            .ok_or_else(|| AbiError::Unknown(trimmed.to_string()))
    }
}

pub struct AbiDescriptor {
    pub abi: Abi,
    pub name: &'static str,
    pub clang_triple: &'static str,
    pub sysroot_triple: &'static str,
    pub is_64_bit: bool,
}

static ABI_REGISTRY: &[AbiDescriptor] = &[
    AbiDescriptor {
        abi: Abi::Arm64V8a,
        name: "arm64-v8a",
        clang_triple: "aarch64-linux-android",
        sysroot_triple: "aarch64-linux-android",
        is_64_bit: true,
    },
    AbiDescriptor {
        abi: Abi::ArmeabiV7a,
        name: "armeabi-v7a",
        clang_triple: "armv7a-linux-androideabi",
        sysroot_triple: "arm-linux-androideabi",
        is_64_bit: false,
    },
    AbiDescriptor {
        abi: Abi::X86,
        name: "x86",
        clang_triple: "i686-linux-android",
        sysroot_triple: "i686-linux-android",
        is_64_bit: false,
    },
    AbiDescriptor {
        abi: Abi::X86_64,
        name: "x86_64",
        clang_triple: "x86_64-linux-android",
        sysroot_triple: "x86_64-linux-android",
        is_64_bit: true,
    },
];

pub fn registry() -> &'static [AbiDescriptor] {
    ABI_REGISTRY
}

pub fn all_abis() -> Vec<Abi> {
    registry().iter().map(|entry| entry.abi).collect()
}

/// Keeps the names that map to a known ABI, dropping duplicates and unknown entries.
pub fn supported_abis<I, S>(names: I) -> Vec<Abi>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut abis = Vec::new();
    for name in names {
        if let Ok(abi) = name.as_ref().parse::<Abi>() {
            if !abis.contains(&abi) {
                abis.push(abi);
            }
        }
    }
    abis
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    #[error("abi name is empty")]
    Empty,
    #[error("unknown abi '{0}'")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abi_round_trips() {
        for abi in all_abis() {
            let decoded: Abi = abi.to_string().parse().expect("should parse");
            assert_eq!(decoded, abi);
        }
    }

    #[test]
    fn armv7_uses_androideabi_triples() {
        let abi = Abi::ArmeabiV7a;
        assert_eq!(abi.clang_target(21), "armv7a-linux-androideabi21");
        assert_eq!(abi.sysroot_triple(), "arm-linux-androideabi");
        assert!(!abi.is_64_bit());
    }

    #[test]
    fn registry_rows_follow_variant_order() {
        for (index, entry) in registry().iter().enumerate() {
            assert_eq!(entry.abi as usize, index);
        }
    }

    #[test]
    fn unknown_abi_rejected() {
        let result: Result<Abi, _> = "mips".parse();
        assert_eq!(result, Err(AbiError::Unknown("mips".to_string())));
    }

    #[test]
    fn supported_abis_filters_and_dedups() {
        let abis = supported_abis(["arm64-v8a", "mips", "arm64-v8a", " x86_64 "]);
        assert_eq!(abis, vec![Abi::Arm64V8a, Abi::X86_64]);
    }
}
