//! Operator-facing text helpers shared by the commands.

use std::fmt::Display;

const RULE_WIDTH: usize = 48;
const LABEL_WIDTH: usize = 18;

/// Print a section header and separator.
pub fn section(title: &str) {
    println!();
    println!("{title}");
    println!("{}", "─".repeat(RULE_WIDTH));
}

pub fn key_value(label: &str, value: impl Display) {
    println!("{label:<LABEL_WIDTH$} {value}");
}

pub fn ok(message: &str) {
    println!("✓ {message}");
}

pub fn warn(message: &str) {
    println!("⚠ {message}");
}

/// Errors go to stderr so scripted checks can tell them apart.
pub fn error(message: &str) {
    eprintln!("✗ {message}");
}

/// Render a per-second rate, treating zero or less as unlimited.
pub fn rate(per_second: f64) -> String {
    if per_second > 0.0 {
        format!("{per_second:.1} msg/s")
    } else {
        "unlimited".into()
    }
}
