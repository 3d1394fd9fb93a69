//! Command-line arguments.

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "bulwark-carver",
    about = "Carver2D block-synchronization engine"
)]
pub struct Opt {
    /// Path to a TOML configuration file.
    #[structopt(long, short = "c")]
    pub config: Option<std::path::PathBuf>,

    /// Roll the ledger back to this height, release the lock, and exit
    /// without syncing.
    pub undo_height: Option<u64>,

    /// Override the node's reported tip height for this run only.
    pub force_rpc_height: Option<u64>,
}

impl Opt {
    pub fn from_args_safe() -> Result<Self, structopt::clap::Error> {
        <Self as StructOpt>::from_args_safe()
    }
}
