use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use aquafeed::cli::{self, Cli};
use aquafeed::config::Config;
use aquafeed::notify::ConsoleTransport;
use aquafeed::service::FeedingService;
use aquafeed::store::Store;

fn main() -> Result<()> {
    let cli_opts = Cli::parse();
    let config = Config::load(cli_opts.overrides())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = Store::open(&config.database_path, config.write_workers)?;
    let result = {
        let transport = Arc::new(ConsoleTransport::stdout(config.notifications_enabled));
        let service = FeedingService::new(&store, transport);
        service
            .startup_cleanup()
            .wait()
            .map_err(anyhow::Error::from)
            .and_then(|startup| cli::run(cli_opts.command, &service, startup))
    };
    store.shutdown();

    result
}
