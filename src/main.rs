//! cloudvol-flex driver entry point

use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use cloudvol_flex::auth::TokenChain;
use cloudvol_flex::cloud::{CloudStorageClient, HttpCloudApi};
use cloudvol_flex::command::DriverCommand;
use cloudvol_flex::config::{Config, LoggingConfig};
use cloudvol_flex::device::DeviceResolver;
use cloudvol_flex::driver::VolumeLifecycleController;
use cloudvol_flex::exec::{CommandRunner, HostCommandRunner};
use cloudvol_flex::hostfs::LocalFs;
use cloudvol_flex::identity;
use cloudvol_flex::mount::MountManager;
use cloudvol_flex::status::DriverStatus;

/// Print a failure envelope and signal a startup error
fn fail_startup(message: impl Into<String>) -> ExitCode {
    println!("{}", DriverStatus::failure(message).to_json());
    ExitCode::FAILURE
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let command = match DriverCommand::parse(&args) {
        Ok(c) => c,
        Err(e) => return fail_startup(e.to_string()),
    };

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => return fail_startup(format!("Failed to load config: {}", e)),
    };

    if let Err(e) = config.validate() {
        return fail_startup(e.to_string());
    }

    if let Err(e) = init_logging(&config.logging) {
        return fail_startup(format!("Failed to open log file: {}", e));
    }

    let controller = match build_controller(&config) {
        Ok(c) => c,
        Err(e) => return fail_startup(e.to_string()),
    };

    let span = info_span!("flex", command = command.name());
    let status = async {
        debug!(?args, "Invoked");
        let status = controller.execute(&command).await;
        info!(status = ?status.status, "Finished");
        status
    }
    .instrument(span)
    .await;

    println!("{}", status.to_json());
    ExitCode::SUCCESS
}

/// Log to stderr, or append to the configured file.
///
/// stdout is reserved for the result envelope.
fn init_logging(logging: &LoggingConfig) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn build_controller(config: &Config) -> cloudvol_flex::Result<VolumeLifecycleController> {
    let runner: Arc<dyn CommandRunner> = Arc::new(HostCommandRunner);

    let tokens = TokenChain::from_config(&config.api);
    let api = HttpCloudApi::new(&config.api, tokens)?;
    let identity = identity::from_config(&config.identity, config.api.timeout)?;

    Ok(VolumeLifecycleController::new(
        CloudStorageClient::from_config(Arc::new(api), config),
        identity,
        DeviceResolver::new(runner.clone()),
        MountManager::new(runner, Arc::new(LocalFs)),
        config,
    ))
}
