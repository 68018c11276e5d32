//! cloudvol-flex: a flex volume driver for cloud block storage
//!
//! The kubelet runs the driver binary once per lifecycle step. Each run
//! parses one command, performs it and prints a single JSON envelope.
//!
//! # Architecture
//!
//! - **Cloud client**: [`cloud::CloudStorageClient`] wraps a [`cloud::CloudApi`]
//!   backend with attach polling and detach retries.
//! - **Device resolver**: [`device::DeviceResolver`] finds the local block
//!   device that backs an attached volume.
//! - **Mount manager**: [`mount::MountManager`] formats and mounts devices
//!   idempotently.
//! - **Controller**: [`driver::VolumeLifecycleController`] maps each flex
//!   command onto the three components above.
//!
//! Host commands, the host filesystem, the cloud API and the node identity
//! all sit behind traits so the controller can be driven by fakes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cloudvol_flex::auth::TokenChain;
//! use cloudvol_flex::cloud::{CloudStorageClient, HttpCloudApi};
//! use cloudvol_flex::command::DriverCommand;
//! use cloudvol_flex::config::Config;
//! use cloudvol_flex::device::DeviceResolver;
//! use cloudvol_flex::driver::VolumeLifecycleController;
//! use cloudvol_flex::exec::HostCommandRunner;
//! use cloudvol_flex::hostfs::LocalFs;
//! use cloudvol_flex::identity;
//! use cloudvol_flex::mount::MountManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let api = HttpCloudApi::new(&config.api, TokenChain::from_config(&config.api))?;
//! let runner = Arc::new(HostCommandRunner);
//!
//! let controller = VolumeLifecycleController::new(
//!     CloudStorageClient::from_config(Arc::new(api), &config),
//!     identity::from_config(&config.identity, config.api.timeout)?,
//!     DeviceResolver::new(runner.clone()),
//!     MountManager::new(runner, Arc::new(LocalFs)),
//!     &config,
//! );
//!
//! let status = controller.execute(&DriverCommand::Init).await;
//! println!("{}", status.to_json());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cloud;
pub mod command;
pub mod config;
pub mod device;
pub mod driver;
pub mod env;
pub mod error;
pub mod exec;
pub mod hostfs;
pub mod identity;
pub mod mount;
pub mod options;
pub mod retry;
pub mod status;

pub use error::{DriverError, Result};
