use std::process::ExitCode;

use bestsellers::{
    cancel::listen_for_interrupt, config::usage_exit_status, info_time, store::hydrate_or_fresh,
    BufferedWriter, CancelToken, Cli, Harvester, NytClient, EXIT_FAILURE,
};
use chrono::Local;
use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let start_time = Local::now();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(usage_exit_status(&err));
        }
    };
    let config = cli.build_config();

    let hydrated = match hydrate_or_fresh(&config.output).await {
        Ok(hydrated) => hydrated,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let client = match NytClient::with_base_url(&cli.api_key, &cli.api_base_url) {
        Ok(client) => client,
        Err(err) => {
            error!("Couldn't build the HTTP client: {err}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let cancel = CancelToken::new();
    listen_for_interrupt(cancel.clone());

    let writer = BufferedWriter::new(&config.output);
    let mut harvester = Harvester::new(client, hydrated.cache, writer, config, cancel);
    let report = harvester.run(hydrated.resume_from).await;
    info_time!(start_time, "Full program time:");

    ExitCode::from(report.exit_status())
}
