#![deny(unsafe_code)]

mod cli;

use std::io;
use std::path::Path;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufRead, BufReader};

use fsaudit::broker::memory::{MemoryBroker, MemoryBrokerScript};
use fsaudit::broker::BrokerClient;
use fsaudit::config::AuditConfiguration;
use fsaudit::error::AuditError;
use fsaudit::logging::{self, AuditLogger};
use fsaudit::models::RunSummary;
use fsaudit::output;
use fsaudit::process::CommandLineResolver;
use fsaudit::relay::{self, RelayOptions};

fn main() {
    let code = match real_main() {
        Ok(()) => 0,
        Err(err) => {
            log::error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            AuditError::exit_code_of(&err)
        }
    };
    std::process::exit(code);
}

fn real_main() -> Result<()> {
    let args = cli::parse_args()?;
    logging::init(args.verbosity, args.quiet_mode);

    let (mut config, config_path) = AuditConfiguration::load(args.config_path.as_deref())?;
    config.apply_overrides(&args.overrides)?;

    let options = RelayOptions {
        poll_interval: config.poll_interval(),
        flush_timeout: config.flush_timeout(),
        template: config.record_template()?,
        resolver: CommandLineResolver::new(),
    };

    AuditLogger::new(&config.broker.topic).log_startup(
        &config.broker.brokers,
        config_path.as_deref(),
        args.dry_run,
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let outcome = runtime.block_on(async {
        if args.dry_run {
            let broker = MemoryBroker::new(MemoryBrokerScript::default().echo());
            return relay_with(broker, &config, &options, args.input.as_deref()).await;
        }
        connect(&config, &options, args.input.as_deref()).await
    });
    // Reads parked on the blocking pool (stdin, FIFOs) are not cancellable
    runtime.shutdown_background();
    let summary = outcome?;

    if !args.quiet_mode {
        let mut stderr = io::stderr().lock();
        if args.json_output {
            output::format_json(&summary, &mut stderr)?;
        } else {
            output::format_human(&summary, &mut stderr)?;
        }
    }
    Ok(())
}

#[cfg(feature = "kafka")]
async fn connect(
    config: &AuditConfiguration,
    options: &RelayOptions,
    input: Option<&Path>,
) -> Result<RunSummary> {
    relay_with(fsaudit::broker::kafka::KafkaBroker, config, options, input).await
}

#[cfg(not(feature = "kafka"))]
async fn connect(
    _config: &AuditConfiguration,
    _options: &RelayOptions,
    _input: Option<&Path>,
) -> Result<RunSummary> {
    Err(AuditError::Settings(
        "built without the `kafka` feature; use --dry-run or rebuild with --features kafka".into(),
    )
    .into())
}

async fn relay_with<C: BrokerClient>(
    client: C,
    config: &AuditConfiguration,
    options: &RelayOptions,
    input: Option<&Path>,
) -> Result<RunSummary> {
    let settings = config.producer_settings()?;
    let reader = open_input(input).await?;
    Ok(relay::start(client, &settings, reader, options, shutdown_signal()).await?)
}

async fn open_input(input: Option<&Path>) -> Result<Box<dyn AsyncBufRead + Unpin>> {
    match input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| anyhow!("failed to open {}: {}", path.display(), e))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
