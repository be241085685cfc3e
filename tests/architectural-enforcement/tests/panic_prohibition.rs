//! Integration Test: Panic Prohibition
//!
//! **Policy**: production code propagates errors with `?` and typed errors.
//! `unwrap()` and `expect()` are for tests only.

use architectural_enforcement::{all_production_lines, report};

#[test]
fn test_no_unwrap_or_expect_in_production_code() {
    let violations: Vec<String> = all_production_lines()
        .iter()
        .filter(|line| line.code.contains(".unwrap()") || line.code.contains(".expect("))
        .map(|line| format!("{} - {}", line.location(), line.text.trim()))
        .collect();

    assert!(
        violations.is_empty(),
        "{}",
        report("unwrap()/expect() in production code", &violations)
    );
}
