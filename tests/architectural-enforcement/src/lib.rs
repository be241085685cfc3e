//! Architectural Enforcement
//!
//! Source scanners shared by the integration tests in `tests/`:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//! - Wire framing stays inside the transport module
//! - No unwrap()/expect() outside tests
//!
//! Production code is everything in a source file before its
//! `#[cfg(test)]` module.

use std::fs;
use std::path::{Path, PathBuf};

/// Source directories holding production code, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["shellwire/core/src", "shellwire/cli/src"];

/// One line of production code
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Full line as written
    pub text: String,
    /// Line with any `//` comment removed
    pub code: String,
}

impl SourceLine {
    /// Path relative to the workspace root, for reporting
    pub fn location(&self) -> String {
        let root = workspace_root();
        let path = self.path.strip_prefix(&root).unwrap_or(&self.path);
        format!("{}:{}", path.display(), self.number)
    }
}

/// Workspace root directory
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files under the production directories
///
/// Panics if a production directory is missing so a moved crate cannot
/// silently escape the checks.
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        assert!(path.is_dir(), "missing source directory: {}", path.display());

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    files.sort();
    files
}

/// Production lines of one file
pub fn production_lines(path: &Path) -> Vec<SourceLine> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .take_while(|line| line.trim() != "#[cfg(test)]")
        .enumerate()
        .map(|(idx, line)| SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            text: line.to_string(),
            code: strip_comment(line).to_string(),
        })
        .collect()
}

/// Production lines of every production file
pub fn all_production_lines() -> Vec<SourceLine> {
    production_files()
        .iter()
        .flat_map(|path| production_lines(path))
        .collect()
}

/// Remove a trailing `//` comment, ignoring `//` inside string literals
pub fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    let bytes = line.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Whether the function enclosing `idx` is declared `async`
///
/// Scans backwards to the nearest function signature.
pub fn in_async_function(lines: &[SourceLine], idx: usize) -> bool {
    for line in lines[..=idx].iter().rev() {
        let code = line.code.trim();
        if code.contains("async fn ") {
            return true;
        }
        if code.starts_with("fn ") || code.contains(" fn ") {
            return false;
        }
        if code.starts_with("mod ") || (code.starts_with("impl") && code.contains('{')) {
            return false;
        }
    }
    false
}

/// Format violations for a failure message
pub fn report(title: &str, violations: &[String]) -> String {
    let mut out = format!("\n{title} ({} found):\n", violations.len());
    for violation in violations {
        out.push_str("  ");
        out.push_str(violation);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<SourceLine> {
        src.iter()
            .enumerate()
            .map(|(idx, text)| SourceLine {
                path: PathBuf::from("x.rs"),
                number: idx + 1,
                text: (*text).to_string(),
                code: strip_comment(text).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("let a = 1; // note"), "let a = 1; ");
        assert_eq!(strip_comment(r#"let u = "ws://host"; // x"#), r#"let u = "ws://host"; "#);
        assert_eq!(strip_comment("/// doc"), "");
        assert_eq!(strip_comment(r#"let s = "a\"//b";"#), r#"let s = "a\"//b";"#);
    }

    #[test]
    fn test_async_function_detection() {
        let src = lines(&[
            "pub async fn run() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
        ]);
        assert!(in_async_function(&src, 1));
    }

    #[test]
    fn test_sync_function_detection() {
        let src = lines(&[
            "    pub fn from_file(path: &Path) -> Result<Self> {",
            "        let contents = std::fs::read_to_string(path)?;",
            "    }",
        ]);
        assert!(!in_async_function(&src, 1));
    }

    #[test]
    fn test_production_files_found() {
        let files = production_files();
        assert!(files.iter().any(|p| p.ends_with("lib.rs")));
        assert!(files.iter().any(|p| p.ends_with("main.rs")));
    }
}
