use std::fmt;

use crate::component::Component;

/// Every tool the build tasks may ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tool {
    AndroidJar,
    Aapt2,
    D8,
    D8Jar,
    Dx,
    ApkSigner,
    Clang,
    ClangXX,
    NdkBuild,
    Cmake,
    Java,
    Javac,
    Kotlinc,
    EcjJar,
    KotlinCompilerJar,
}

/// Whether a tool is launched directly or loaded through the Java runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
    Executable,
    Archive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolLocation {
    /// Relative path inside a component's install directory.
    InComponent(Component, &'static str),
    /// Binary under the NDK host prebuilt `bin/` directory.
    NdkPrebuilt(&'static str),
    /// Jar under `<install_root>/jars`.
    BundledJar(&'static str),
    /// `<install_root>/bin/<name>`, then the search path.
    Host(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub tool: Tool,
    pub name: &'static str,
    pub kind: ToolKind,
    pub location: ToolLocation,
}

impl Tool {
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn kind(self) -> ToolKind {
        self.descriptor().kind
    }

    pub fn location(self) -> ToolLocation {
        self.descriptor().location
    }

    /// Component that has to be installed before this tool can exist.
    pub fn component(self) -> Option<Component> {
        match self.location() {
            ToolLocation::InComponent(component, _) => Some(component),
            ToolLocation::NdkPrebuilt(_) => Some(Component::Ndk),
            ToolLocation::BundledJar(_) | ToolLocation::Host(_) => None,
        }
    }

    pub fn descriptor(self) -> &'static ToolDescriptor {
        // registry rows are declared in variant order
        &TOOL_REGISTRY[self as usize]
    }

    pub fn all() -> impl Iterator<Item = Tool> {
        TOOL_REGISTRY.iter().map(|entry| entry.tool)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const fn executable(tool: Tool, name: &'static str, location: ToolLocation) -> ToolDescriptor {
    ToolDescriptor {
        tool,
        name,
        kind: ToolKind::Executable,
        location,
    }
}

const fn archive(tool: Tool, name: &'static str, location: ToolLocation) -> ToolDescriptor {
    ToolDescriptor {
        tool,
        name,
        kind: ToolKind::Archive,
        location,
    }
}

static TOOL_REGISTRY: &[ToolDescriptor] = &[
    archive(
        Tool::AndroidJar,
        "android.jar",
        ToolLocation::InComponent(Component::Platform, "android.jar"),
    ),
    executable(
        Tool::Aapt2,
        "aapt2",
        ToolLocation::InComponent(Component::BuildTools, "aapt2"),
    ),
    executable(
        Tool::D8,
        "d8",
        ToolLocation::InComponent(Component::BuildTools, "d8"),
    ),
    archive(
        Tool::D8Jar,
        "d8.jar",
        ToolLocation::InComponent(Component::BuildTools, "lib/d8.jar"),
    ),
    executable(
        Tool::Dx,
        "dx",
        ToolLocation::InComponent(Component::BuildTools, "dx"),
    ),
    executable(
        Tool::ApkSigner,
        "apksigner",
        ToolLocation::InComponent(Component::BuildTools, "apksigner"),
    ),
    executable(Tool::Clang, "clang", ToolLocation::NdkPrebuilt("clang")),
    executable(Tool::ClangXX, "clang++", ToolLocation::NdkPrebuilt("clang++")),
    executable(
        Tool::NdkBuild,
        "ndk-build",
        ToolLocation::InComponent(Component::Ndk, "ndk-build"),
    ),
    executable(Tool::Cmake, "cmake", ToolLocation::Host("cmake")),
    executable(Tool::Java, "java", ToolLocation::Host("java")),
    executable(Tool::Javac, "javac", ToolLocation::Host("javac")),
    executable(Tool::Kotlinc, "kotlinc", ToolLocation::Host("kotlinc")),
    archive(Tool::EcjJar, "ecj.jar", ToolLocation::BundledJar("ecj.jar")),
    archive(
        Tool::KotlinCompilerJar,
        "kotlin-compiler.jar",
        ToolLocation::BundledJar("kotlin-compiler.jar"),
    ),
];
