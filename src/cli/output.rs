//! # CLI Output Helpers
//!
//! Status lines for device and route commands. Icons fall back to ASCII on
//! Windows consoles.

use console::{style, StyledObject};
use std::fmt::Display;

/// Kind of status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Step completed
    Done,
    /// Something was skipped or degraded
    Warning,
    /// Command failed
    Failed,
    /// Long-running state, e.g. routes installed or packets flowing
    Live,
}

impl Status {
    /// Icon text including trailing spacing.
    #[cfg(unix)]
    pub fn symbol(self) -> &'static str {
        match self {
            Status::Done => "✅",
            Status::Warning => "⚡",
            Status::Failed => "❌",
            Status::Live => "● ",
        }
    }

    #[cfg(windows)]
    pub fn symbol(self) -> &'static str {
        match self {
            Status::Done => "[OK] ",
            Status::Warning => "[!] ",
            Status::Failed => "[ERR] ",
            Status::Live => "[*] ",
        }
    }

    /// Styled icon for this status.
    pub fn icon(self) -> StyledObject<&'static str> {
        let icon = style(self.symbol()).bold();
        match self {
            Status::Done => icon.green(),
            Status::Warning => icon.yellow(),
            Status::Failed => icon.red(),
            Status::Live => icon.cyan(),
        }
    }
}

fn print_status(status: Status, msg: impl Display) {
    println!(" {}{}", status.icon(), msg);
}

/// Print a completed step
pub fn print_success(msg: &str) {
    print_status(Status::Done, msg);
}

/// Print an error message to stderr
pub fn print_error(msg: impl Display) {
    eprintln!(" {}Error: {}", Status::Failed.icon(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    print_status(Status::Warning, msg);
}

/// Print a line for something that stays active until the user stops it
pub fn print_active(msg: &str) {
    print_status(Status::Live, msg);
}

/// Aligned `label: value` line
pub fn print_field(label: &str, value: impl Display) {
    println!("   {:<10} {}", style(format!("{}:", label)).dim(), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_are_distinct() {
        let all = [Status::Done, Status::Warning, Status::Failed, Status::Live];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.symbol(), b.symbol());
            }
        }
    }
}
