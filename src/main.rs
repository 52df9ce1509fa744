//! # tunbridge - TUN/TAP device and route lifecycle tool

use tunbridge::cli;

fn main() {
    if let Err(e) = cli::run() {
        cli::exit_with_error(e);
    }
}
