//! Classification of compiler and tool output lines.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    Log,
    Warning,
    Error,
}

/// Substring match over the formats javac, ecj, kotlinc, clang and the
/// Android build tools print.
pub fn classify(line: &str) -> LineKind {
    let trimmed = line.trim_start();
    let lower = trimmed.to_ascii_lowercase();
    if trimmed.starts_with("e: ")
        || lower.contains("error:")
        || lower.starts_with("error ")
        || lower.contains("fatal error")
        || lower.contains("exception in thread")
    {
        LineKind::Error
    } else if trimmed.starts_with("w: ") || lower.contains("warning:") || lower.starts_with("warning ") {
        LineKind::Warning
    } else {
        LineKind::Log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_common_compiler_formats() {
        assert_eq!(classify("Main.java:3: error: ';' expected"), LineKind::Error);
        assert_eq!(classify("e: Main.kt: (3, 5): unresolved reference"), LineKind::Error);
        assert_eq!(classify("native.c:1:10: fatal error: 'x.h' file not found"), LineKind::Error);
        assert_eq!(classify("ERROR in Main.java (at line 4)"), LineKind::Error);
        assert_eq!(classify("w: parameter 'x' is never used"), LineKind::Warning);
        assert_eq!(classify("Main.java:5: warning: [deprecation]"), LineKind::Warning);
        assert_eq!(classify("1 file compiled"), LineKind::Log);
    }
}
