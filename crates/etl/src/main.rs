use anyhow::Context;
use slog::{error, info, Logger};
use std::{process::ExitCode, sync::Arc, time::Duration};
use tokio::time::interval;
use weather_etl::{
    get_config_info, setup_logger, Cli, Location, OpenMeteoClient, Pipeline, PipelineSettings,
    Warehouse,
};

#[tokio::main]
async fn main() -> Result<ExitCode, anyhow::Error> {
    let (cli, config_source) = get_config_info()?;
    let logger = setup_logger(&cli)?;

    let locations = cli.locations();
    info!(logger, "Weather ETL starting...");
    info!(logger, "  Config: {}", config_source);
    info!(logger, "  Raw dir: {}", cli.raw_dir().display());
    info!(logger, "  Archive dir: {}", cli.processed_dir().display());
    info!(logger, "  Warehouse: {}", cli.warehouse_path().display());
    info!(logger, "  Locations: {}", locations.len());

    let source = OpenMeteoClient::new(
        logger.clone(),
        cli.api_url(),
        &cli.user_agent(),
        cli.request_timeout(),
    )
    .context("Failed to build forecast client")?;
    let pipeline = Pipeline::new(
        logger.clone(),
        Arc::new(source),
        PipelineSettings {
            raw_dir: cli.raw_dir(),
            archive_dir: cli.processed_dir(),
            isolate_failures: cli.isolate_failures,
        },
    );
    let mut warehouse = Warehouse::open(cli.warehouse_path(), logger.clone())
        .context("Failed to open warehouse")?;

    if cli.once {
        let report = pipeline.run(&mut warehouse, &locations).await;
        return Ok(if report.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    run_on_interval(&cli, &logger, &pipeline, &mut warehouse, &locations).await;
    Ok(ExitCode::SUCCESS)
}

async fn run_on_interval(
    cli: &Cli,
    logger: &Logger,
    pipeline: &Pipeline,
    warehouse: &mut Warehouse,
    locations: &[Location],
) {
    let sleep_between_runs = cli.sleep_interval();
    info!(
        logger,
        "Wait time between pipeline runs: {} seconds", sleep_between_runs
    );

    // first tick completes immediately
    let mut run_interval = interval(Duration::from_secs(sleep_between_runs));
    loop {
        tokio::select! {
            _ = run_interval.tick() => {
                let report = pipeline.run(warehouse, locations).await;
                if report.is_success() {
                    info!(logger, "Finished pipeline run, waiting {} seconds for next run", sleep_between_runs);
                } else {
                    error!(logger, "Pipeline run {} ended with status {}", report.run_id, report.status.as_str());
                }
            }
            _ = shutdown_signal() => {
                info!(logger, "Shutdown signal received, stopping");
                break;
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
