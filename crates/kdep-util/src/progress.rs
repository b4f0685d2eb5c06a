//! Status lines for solve, lock and vendor operations, printed to stderr
//! with the label right-aligned in a 12-column gutter.

use std::io::Write;

use console::Style;

fn emit(style: Style, label: &str, message: &str) {
    let _ = writeln!(std::io::stderr(), "{}", render(&style, label, message));
}

fn render(style: &Style, label: &str, message: &str) -> String {
    format!("{:>12} {message}", style.apply_to(label))
}

/// An action taken, e.g. `     Locking 3 project(s)`. Bold green label.
pub fn status(label: &str, message: &str) {
    emit(Style::new().green().bold(), label, message);
}

/// Nothing was changed: a fresh lock, a dry-run line. Bold cyan label.
pub fn status_info(label: &str, message: &str) {
    emit(Style::new().cyan().bold(), label, message);
}

/// Something went partly wrong, e.g. a vendor link. Bold yellow label.
pub fn status_warn(label: &str, message: &str) {
    emit(Style::new().yellow().bold(), label, message);
}
