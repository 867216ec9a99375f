//! Terminal output formatting with colors
//!
//! Respects NO_COLOR, CLICOLOR, CLICOLOR_FORCE automatically.
//! Status lines go to stderr so stdout stays a clean JSON stream.

use colored::Colorize;

use crate::domain::validator::{ValidationReport, ValidationSummary};

/// Print error (red bold "error:" prefix) to stderr
pub fn error(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// Print warning (yellow "Warning:" prefix) to stderr
pub fn warning(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

/// Print success status (green checkmark) to stderr
pub fn success(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{} {}", "✓".green(), msg);
}

/// Print failure status (red X, indented) to stderr
pub fn failure(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("  {} {}", "✗".red(), msg);
}

/// Print completed action (green label) to stderr
pub fn action(label: &str, msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", label.green(), msg);
}

/// Print section header (cyan bold)
pub fn header(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

/// Print indented detail (no color)
pub fn detail(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("  {}", msg);
}

/// Print plain output (no color, for data)
pub fn info(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg);
}

/// One school: a checkmark line, or its errors, then its warnings.
pub fn report(report: &ValidationReport) {
    let label = format!(
        "{} ({}/{} reachable)",
        report.school, report.reachable_nodes, report.total_nodes
    );
    if report.is_valid() {
        success(&label);
    } else {
        eprintln!("{} {}", "✗".red(), label);
        for e in report.errors() {
            failure(&e);
        }
    }
    for w in report.warnings() {
        eprintln!("  {} {}", "!".yellow(), w);
    }
}

pub fn summary(summary: &ValidationSummary) {
    let line = format!(
        "{}/{} schools valid, {}/{} nodes reachable, {} error(s), {} warning(s)",
        summary.valid_schools,
        summary.total_schools,
        summary.reachable_nodes,
        summary.total_nodes,
        summary.errors.len(),
        summary.warnings.len()
    );
    if summary.all_valid {
        action("ok", &line);
    } else {
        error(&line);
    }
}
