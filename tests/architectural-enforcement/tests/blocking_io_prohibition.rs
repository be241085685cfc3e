//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async functions MUST NOT use blocking I/O.
//! **Required**: `tokio::io`, `tokio::net`, `tokio::fs`.
//!
//! Blocking calls are acceptable in plain functions that run before the
//! runtime or during configuration loading.

use architectural_enforcement::{in_async_function, production_files, production_lines, report};

const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
    ("std::io::Read", "Blocking read trait"),
];

#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for path in production_files() {
        let lines = production_lines(&path);
        for (idx, line) in lines.iter().enumerate() {
            for (pattern, what) in FORBIDDEN {
                if line.code.contains(pattern) && in_async_function(&lines, idx) {
                    violations.push(format!("{} - {what}: {}", line.location(), line.text.trim()));
                }
            }
        }
    }

    assert!(
        violations.is_empty(),
        "{}",
        report("Blocking I/O in async functions", &violations)
    );
}
