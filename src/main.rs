//! Binary entry point: parse CLI args, load configuration, wire up the
//! concrete `NodeClient`/`Store`/`AddressClassifier` adapters, and hand off
//! to the `SyncCoordinator`.

use bulwark_carver::classify::ScriptClassifier;
use bulwark_carver::cli::Opt;
use bulwark_carver::config::Config;
use bulwark_carver::rpc::bitcoind::BitcoindClient;
use bulwark_carver::store::mongo::MongoStore;
use bulwark_carver::sync_coordinator::SyncCoordinator;

#[tokio::main]
async fn main() {
    env_logger::init();

    let opt = match Opt::from_args_safe() {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = run(opt).await {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(opt: Opt) -> bulwark_carver::Result<()> {
    let config = match &opt.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let client = BitcoindClient::connect(&config.rpc)?;
    let store = MongoStore::connect(&config.store).await?;
    let classifier = ScriptClassifier;

    let coordinator = SyncCoordinator::new(&config, &client, &store, &classifier);

    if let Some(height) = opt.undo_height {
        return coordinator.undo_only(height).await;
    }

    coordinator.run(opt.force_rpc_height).await
}
