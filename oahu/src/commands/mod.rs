mod decrypt;
mod inspect;
mod split;
mod utils;
mod voucher;

pub use decrypt::Decrypt;
pub use inspect::Inspect;
pub use split::Split;
pub use voucher::VoucherInfo;

use clap::{ColorChoice, Parser, Subcommand};

/// Decrypt, inspect and split protected audiobook files.
#[derive(Debug, Clone, Parser)]
#[command(version, author = "clitic <clitic21@gmail.com>", about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// When to output colored text.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Show more log output, repeat for trace level.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only show errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Decrypt(Decrypt),
    Inspect(Inspect),
    Split(Split),
    Voucher(VoucherInfo),
}
