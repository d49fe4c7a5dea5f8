//! Dependency declarations read from the project directory.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use droidforge_core::Dependency;

use crate::error::ResolveError;

pub const DEPENDENCY_LIST_FILE: &str = "dependencies.txt";
const GRADLE_FILES: [&str; 2] = ["build.gradle", "build.gradle.kts"];

fn gradle_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"^\s*(?:implementation|api|compileOnly|runtimeOnly)\s*\(?\s*["']([^"':\s]+:[^"':\s]+:[^"'\s]+)["']"#,
        )
        .unwrap_or_else(|error| panic!("gradle dependency pattern is invalid: {error}"))
    })
}

/// Quoted `group:artifact:version` coordinates on
/// `implementation|api|compileOnly|runtimeOnly` lines.
pub fn parse_gradle(contents: &str) -> Vec<Dependency> {
    let mut dependencies = Vec::new();
    for line in contents.lines() {
        if let Some(captures) = gradle_pattern().captures(line) {
            match captures[1].parse::<Dependency>() {
                Ok(dependency) => dependencies.push(dependency),
                Err(error) => warn!(line = line.trim(), %error, "ignoring malformed coordinate"),
            }
        }
    }
    dependencies
}

/// One coordinate per line; `#` starts a comment.
pub fn parse_list(contents: &str) -> Result<Vec<Dependency>, String> {
    let mut dependencies = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let dependency = line
            .parse::<Dependency>()
            .map_err(|error| format!("line {}: {}", number + 1, error))?;
        dependencies.push(dependency);
    }
    Ok(dependencies)
}

/// Gathers declarations from the gradle scripts and `dependencies.txt` in
/// `project_dir`, without duplicates, in declaration order.
pub fn collect_declarations(project_dir: &Path) -> Result<Vec<Dependency>, ResolveError> {
    let mut dependencies: Vec<Dependency> = Vec::new();
    for name in GRADLE_FILES {
        let path = project_dir.join(name);
        if !path.is_file() {
            continue;
        }
        let contents = std::fs::read_to_string(&path).map_err(|error| ResolveError::io(&path, error))?;
        dependencies.extend(parse_gradle(&contents));
    }
    let list = project_dir.join(DEPENDENCY_LIST_FILE);
    if list.is_file() {
        let contents = std::fs::read_to_string(&list).map_err(|error| ResolveError::io(&list, error))?;
        let parsed = parse_list(&contents).map_err(|reason| ResolveError::Declarations {
            path: list.display().to_string(),
            reason,
        })?;
        dependencies.extend(parsed);
    }
    let mut unique = Vec::with_capacity(dependencies.len());
    for dependency in dependencies {
        if !unique.contains(&dependency) {
            unique.push(dependency);
        }
    }
    Ok(unique)
}
