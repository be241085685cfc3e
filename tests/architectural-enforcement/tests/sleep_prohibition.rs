//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep. Sessions wait on
//! connection events, channels and deadlines (`sleep_until`, `interval`,
//! `timeout`), never on a fixed pause.

use architectural_enforcement::{all_production_lines, report};

#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<String> = all_production_lines()
        .iter()
        .filter(|line| line.code.contains("::sleep(") || line.code.contains(".sleep("))
        .map(|line| format!("{} - {}", line.location(), line.text.trim()))
        .collect();

    assert!(
        violations.is_empty(),
        "{}",
        report("Sleep calls in production code", &violations)
    );
}

#[test]
fn test_no_thread_sleep_anywhere_in_sources() {
    let violations: Vec<String> = all_production_lines()
        .iter()
        .filter(|line| line.code.contains("thread::sleep"))
        .map(|line| format!("{} - {}", line.location(), line.text.trim()))
        .collect();

    assert!(
        violations.is_empty(),
        "{}",
        report("std::thread::sleep blocks the runtime", &violations)
    );
}
