//! # CLI Application
//!
//! CLI definition and command dispatch using clap.

use clap::{Parser, Subcommand};

use super::commands::{cmd_gateway, cmd_init, cmd_probe, cmd_route};
use super::output;
use super::CliResult;

/// tunbridge - TUN/TAP device and route lifecycle tool
#[derive(Parser)]
#[command(
    name = "tunbridge",
    version = env!("CARGO_PKG_VERSION"),
    about = "TUN/TAP device and route lifecycle tool",
    long_about = None,
    after_help = "Examples:\n  \
        tunbridge gateway\n  \
        tunbridge probe -c tunbridge.toml -n 5\n  \
        tunbridge route -c tunbridge.toml\n  \
        tunbridge init > tunbridge.toml\n\n\
        Note: probe and route need root (Administrator on Windows).",
    styles = get_styles(),
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current default gateway
    #[command(visible_alias = "gw")]
    Gateway,

    /// Open the device and print packets read from it
    Probe {
        /// Config file path
        #[arg(short, long, default_value = default_config())]
        config: String,

        /// Number of packets to read
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },

    /// Route through the VPN gateway until Enter is pressed
    Route {
        /// Config file path
        #[arg(short, long, default_value = default_config())]
        config: String,
    },

    /// Create config template
    Init,
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            clap::builder::styling::AnsiColor::BrightCyan
                .on_default()
                .bold(),
        )
        .header(
            clap::builder::styling::AnsiColor::BrightCyan
                .on_default()
                .bold(),
        )
        .literal(clap::builder::styling::AnsiColor::BrightGreen.on_default())
        .placeholder(clap::builder::styling::AnsiColor::Cyan.on_default())
        .valid(clap::builder::styling::AnsiColor::BrightGreen.on_default())
        .invalid(clap::builder::styling::AnsiColor::BrightRed.on_default())
}

#[cfg(unix)]
fn default_config() -> &'static str {
    "/etc/tunbridge/tunbridge.toml"
}

#[cfg(windows)]
fn default_config() -> &'static str {
    "C:\\ProgramData\\tunbridge\\tunbridge.toml"
}

/// Run the CLI application
pub fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Gateway => cmd_gateway(cli.verbose),

        Commands::Probe { config, count } => cmd_probe(&config, count, cli.verbose),

        Commands::Route { config } => cmd_route(&config, cli.verbose),

        Commands::Init => cmd_init(),
    }
}

/// Print error and exit
pub fn exit_with_error(e: impl std::fmt::Display) -> ! {
    output::print_error(e);
    std::process::exit(1);
}
