//! Test harness for driving the controller against in-memory fakes
//!
//! [`FakeCloud`] stands in for the remote API and [`FakeHost`] for host
//! tools and the host filesystem. Both record what was asked of them so
//! tests can assert on side effects.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use cloudvol_flex::cloud::{
    CloudApi, CloudStorageClient, ComputeNode, NodeAddress, ServerRef, StorageVolume,
};
use cloudvol_flex::command::DriverCommand;
use cloudvol_flex::config::Config;
use cloudvol_flex::device::DeviceResolver;
use cloudvol_flex::driver::VolumeLifecycleController;
use cloudvol_flex::exec::{CommandOutput, CommandRunner, HostCommand};
use cloudvol_flex::hostfs::HostFs;
use cloudvol_flex::identity::{NodeIdentity, StaticIdentity};
use cloudvol_flex::mount::MountManager;
use cloudvol_flex::status::DriverStatus;
use cloudvol_flex::{DriverError, Result};

pub const NODE_ID: &str = "SRV1";
pub const VOLUME_ID: &str = "S1";
pub const VOLUME_NAME: &str = "pvc-42ab-cd";
pub const VOLUME_SERIAL: &str = "600140512345";
pub const BY_ID_DEVICE: &str = "/dev/disk/by-id/scsi-3600140512345";
pub const MOUNT_DIR: &str =
    "/var/lib/kubelet/plugins/kubernetes.io/flexvolume/cloudvol/mounts/pvc-42ab-cd";

/// Initialize logging for tests
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Config tuned for tests: no sleeping between polls or retries
pub fn test_config(extra: &str) -> Config {
    let yaml = format!(
        "attach:\n  poll_attempts: 3\n  poll_interval: 0s\ndetach:\n  delay: 0s\n{}",
        extra
    );
    let config = Config::from_str(&yaml).expect("test config parses");
    config.validate().expect("test config is valid");
    config
}

/// Flex options as the kubelet would pass them
pub fn options(extra: &[(&str, &str)]) -> String {
    let mut map = serde_json::Map::new();
    map.insert("storageID".to_string(), VOLUME_ID.into());
    map.insert("kubernetes.io/pvOrVolumeName".to_string(), VOLUME_NAME.into());
    for (key, value) in extra {
        map.insert(key.to_string(), (*value).into());
    }
    serde_json::Value::Object(map).to_string()
}

/// A volume named `name`, optionally attached to `server`
pub fn named_volume(id: &str, name: &str, server: Option<&str>) -> StorageVolume {
    StorageVolume {
        id: id.to_string(),
        name: name.to_string(),
        serial: String::new(),
        state: Some("POWERED_ON".to_string()),
        server: server.map(|id| ServerRef {
            id: id.to_string(),
            name: None,
        }),
    }
}

pub fn volume(attached: bool) -> StorageVolume {
    StorageVolume {
        id: VOLUME_ID.to_string(),
        name: VOLUME_NAME.to_string(),
        serial: VOLUME_SERIAL.to_string(),
        state: Some("POWERED_ON".to_string()),
        server: attached.then(|| ServerRef {
            id: NODE_ID.to_string(),
            name: Some("node-a".to_string()),
        }),
    }
}

// ============================================================================
// Remote API fake
// ============================================================================

/// In-memory cloud. Volume state reads "BUSY" until `ready_after` polls.
pub struct FakeCloud {
    volumes: Mutex<Vec<StorageVolume>>,
    servers: Vec<ComputeNode>,
    ready_after: usize,
    polls: Mutex<usize>,
    detach_failures: Mutex<usize>,
    calls: Mutex<Vec<String>>,
}

impl FakeCloud {
    pub fn new(volumes: Vec<StorageVolume>) -> Self {
        Self {
            volumes: Mutex::new(volumes),
            servers: vec![ComputeNode {
                id: NODE_ID.to_string(),
                name: "node-a".to_string(),
                addresses: vec![NodeAddress {
                    address: "10.0.0.5".to_string(),
                }],
            }],
            ready_after: 1,
            polls: Mutex::new(0),
            detach_failures: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ready_after(mut self, polls: usize) -> Self {
        self.ready_after = polls;
        self
    }

    pub fn failing_detaches(self, failures: usize) -> Self {
        *self.detach_failures.lock() = failures;
        self
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock()
    }

    /// Calls that change remote state, e.g. `attach S1 SRV1`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(verb))
            .count()
    }

    fn set_server(&self, volume_id: &str, server: Option<ServerRef>) -> Result<()> {
        let mut volumes = self.volumes.lock();
        let volume = volumes
            .iter_mut()
            .find(|v| v.id == volume_id)
            .ok_or_else(|| DriverError::NotFound(volume_id.to_string()))?;
        volume.server = server;
        Ok(())
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn get_volume(&self, volume_id: &str) -> Result<StorageVolume> {
        self.volumes
            .lock()
            .iter()
            .find(|v| v.id == volume_id)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(volume_id.to_string()))
    }

    async fn list_volumes(&self) -> Result<Vec<StorageVolume>> {
        Ok(self.volumes.lock().clone())
    }

    async fn get_server(&self, server_id: &str) -> Result<ComputeNode> {
        self.servers
            .iter()
            .find(|s| s.id == server_id)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(server_id.to_string()))
    }

    async fn list_servers(&self) -> Result<Vec<ComputeNode>> {
        Ok(self.servers.clone())
    }

    async fn attach_volume(&self, volume_id: &str, server_id: &str) -> Result<()> {
        self.calls
            .lock()
            .push(format!("attach {} {}", volume_id, server_id));
        self.set_server(
            volume_id,
            Some(ServerRef {
                id: server_id.to_string(),
                name: None,
            }),
        )
    }

    async fn detach_volume(&self, volume_id: &str, server_id: &str) -> Result<()> {
        self.calls
            .lock()
            .push(format!("detach {} {}", volume_id, server_id));
        {
            let mut failures = self.detach_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(DriverError::RemoteTransport("503 Service Unavailable".to_string()));
            }
        }
        self.set_server(volume_id, None)
    }

    async fn volume_state(&self, _volume_id: &str) -> Result<Option<String>> {
        let mut polls = self.polls.lock();
        *polls += 1;
        let state = if *polls >= self.ready_after {
            "POWERED_ON"
        } else {
            "BUSY"
        };
        Ok(Some(state.to_string()))
    }
}

// ============================================================================
// Host fake
// ============================================================================

/// Host double: block devices, a mount table, filesystem signatures and
/// scripted `lsblk -J` snapshots.
#[derive(Default)]
pub struct FakeHost {
    block_devices: Mutex<HashSet<String>>,
    mounted: Mutex<HashSet<String>>,
    fs_types: Mutex<HashMap<String, String>>,
    snapshots: Mutex<VecDeque<String>>,
    dirs: Mutex<HashSet<PathBuf>>,
    commands: Mutex<Vec<String>>,
    dir_ops: Mutex<Vec<String>>,
    fail_mount: bool,
    fail_umount: bool,
}

impl FakeHost {
    pub fn with_device(device: &str) -> Self {
        let host = Self::default();
        host.add_device(device);
        host
    }

    /// Make every `mount` exit with status 32
    pub fn failing_mount(mut self) -> Self {
        self.fail_mount = true;
        self
    }

    /// Make every `umount` report a busy target
    pub fn failing_umount(mut self) -> Self {
        self.fail_umount = true;
        self
    }

    pub fn add_device(&self, device: &str) {
        self.block_devices.lock().insert(device.to_string());
    }

    pub fn mark_mounted(&self, target: &str) {
        self.mounted.lock().insert(target.to_string());
        self.dirs.lock().insert(PathBuf::from(target));
    }

    pub fn set_fs_type(&self, device: &str, fs_type: &str) {
        self.fs_types
            .lock()
            .insert(device.to_string(), fs_type.to_string());
    }

    /// Queue `lsblk -J` outputs; the last one repeats
    pub fn push_snapshot(&self, json: &str) {
        self.snapshots.lock().push_back(json.to_string());
    }

    pub fn is_mounted(&self, target: &str) -> bool {
        self.mounted.lock().contains(target)
    }

    /// Every command run, formatted as a shell line
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn count(&self, program: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(program))
            .count()
    }

    pub fn dir_ops(&self) -> Vec<String> {
        self.dir_ops.lock().clone()
    }

    fn next_snapshot(&self) -> String {
        let mut snapshots = self.snapshots.lock();
        if snapshots.len() > 1 {
            snapshots.pop_front().unwrap_or_default()
        } else {
            snapshots
                .front()
                .cloned()
                .unwrap_or_else(|| r#"{"blockdevices": []}"#.to_string())
        }
    }
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        self.commands.lock().push(command.to_string());

        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        let output = match (command.program.as_str(), args.as_slice()) {
            ("lsblk", ["-J", ..]) => CommandOutput::ok(self.next_snapshot()),
            ("lsblk", ["-n", "-o", "FSTYPE", device]) => {
                let fs_type = self.fs_types.lock().get(*device).cloned().unwrap_or_default();
                CommandOutput::ok(format!("{}\n", fs_type))
            }
            ("findmnt", ["-n", target]) => {
                if self.mounted.lock().contains(*target) {
                    CommandOutput::ok(format!("{} /dev/sdx ext4 rw,relatime\n", target))
                } else {
                    CommandOutput::failed(1, "")
                }
            }
            ("mkfs", ["-t", fs_type, device]) => {
                self.set_fs_type(device, fs_type);
                CommandOutput::ok("")
            }
            ("mount", _) if self.fail_mount => {
                CommandOutput::failed(32, "mount: wrong fs type, bad option, bad superblock")
            }
            ("mount", rest) => {
                let target = rest.last().copied().unwrap_or_default();
                self.mounted.lock().insert(target.to_string());
                CommandOutput::ok("")
            }
            ("umount", _) if self.fail_umount => {
                CommandOutput::failed(32, "umount: target is busy")
            }
            ("umount", [target]) => {
                self.mounted.lock().remove(*target);
                CommandOutput::ok("")
            }
            _ => CommandOutput::failed(127, format!("{}: command not found", command.program)),
        };
        Ok(output)
    }
}

#[async_trait]
impl HostFs for FakeHost {
    async fn is_block_device(&self, path: &Path) -> Result<bool> {
        let path = path.to_string_lossy();
        if self.block_devices.lock().contains(&*path) {
            Ok(true)
        } else {
            Err(DriverError::Validation(format!(
                "could not stat device {}: No such file or directory",
                path
            )))
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        self.dirs.lock().contains(path)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.dir_ops
            .lock()
            .push(format!("mkdir {}", path.display()));
        self.dirs.lock().insert(path.to_path_buf());
        Ok(())
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.dir_ops
            .lock()
            .push(format!("rmdir {}", path.display()));
        self.dirs.lock().remove(path);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A controller wired to fakes
pub struct TestHarness {
    pub cloud: Arc<FakeCloud>,
    pub host: Arc<FakeHost>,
    controller: VolumeLifecycleController,
}

impl TestHarness {
    pub fn new(cloud: FakeCloud, host: FakeHost) -> Self {
        Self::with_config(cloud, host, test_config(""))
    }

    pub fn with_config(cloud: FakeCloud, host: FakeHost, config: Config) -> Self {
        init_logging();

        let cloud = Arc::new(cloud);
        let host = Arc::new(host);

        let controller = VolumeLifecycleController::new(
            CloudStorageClient::from_config(cloud.clone(), &config),
            Arc::new(StaticIdentity(NodeIdentity::ServerId(NODE_ID.to_string()))),
            DeviceResolver::new(host.clone()),
            MountManager::new(host.clone(), host.clone()),
            &config,
        );

        Self {
            cloud,
            host,
            controller,
        }
    }

    /// Run a command line the way the kubelet would invoke the driver
    pub async fn run(&self, args: &[&str]) -> DriverStatus {
        match DriverCommand::parse(args) {
            Ok(command) => self.controller.execute(&command).await,
            Err(e) => DriverStatus::failure(e.to_string()),
        }
    }

    /// Run and decode the JSON envelope the binary would print
    pub async fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let status = self.run(args).await;
        serde_json::from_str(&status.to_json()).expect("envelope is valid JSON")
    }
}
