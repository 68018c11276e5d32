//! Flex command line parsing
//!
//! The kubelet calls the driver as `<driver> <command> [args...]`. Commands
//! the driver does not know are answered with a "Not supported" envelope so
//! the kubelet falls back to its own behaviour.

use crate::error::{DriverError, Result};

/// One parsed driver invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    Init,
    Attach {
        options: String,
        node: String,
    },
    Detach {
        device: String,
        node: String,
    },
    WaitForAttach {
        device: String,
        options: String,
    },
    IsAttached {
        options: String,
        node: String,
    },
    MountDevice {
        mount_dir: String,
        device: String,
        options: String,
    },
    UnmountDevice {
        mount_dir: String,
    },
    GetVolumeName {
        options: String,
    },
    Mount {
        mount_dir: String,
        options: String,
    },
    Unmount {
        mount_dir: String,
    },
    /// A command name this driver does not implement
    Unsupported(String),
}

impl DriverCommand {
    /// Parse the arguments following the program name.
    ///
    /// Extra trailing arguments are ignored; missing ones are a validation
    /// error.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let (name, rest) = match args.split_first() {
            Some((name, rest)) => (name.as_ref(), rest),
            None => return Err(DriverError::Validation("no command given".to_string())),
        };

        let arg = |i: usize, what: &str| -> Result<String> {
            rest.get(i).map(|a| a.as_ref().to_string()).ok_or_else(|| {
                DriverError::Validation(format!("{} requires a {} argument", name, what))
            })
        };

        Ok(match name {
            "init" => Self::Init,
            "attach" => Self::Attach {
                options: arg(0, "json options")?,
                node: arg(1, "node name")?,
            },
            "detach" => Self::Detach {
                device: arg(0, "device")?,
                node: arg(1, "node name")?,
            },
            "waitforattach" => Self::WaitForAttach {
                device: arg(0, "device")?,
                options: arg(1, "json options")?,
            },
            "isattached" => Self::IsAttached {
                options: arg(0, "json options")?,
                node: arg(1, "node name")?,
            },
            "mountdevice" => Self::MountDevice {
                mount_dir: arg(0, "mount directory")?,
                device: arg(1, "device")?,
                options: arg(2, "json options")?,
            },
            "unmountdevice" => Self::UnmountDevice {
                mount_dir: arg(0, "mount directory")?,
            },
            "getvolumename" => Self::GetVolumeName {
                options: arg(0, "json options")?,
            },
            "mount" => Self::Mount {
                mount_dir: arg(0, "mount directory")?,
                options: arg(1, "json options")?,
            },
            "unmount" => Self::Unmount {
                mount_dir: arg(0, "mount directory")?,
            },
            other => Self::Unsupported(other.to_string()),
        })
    }

    /// The command name as the kubelet spells it
    pub fn name(&self) -> &str {
        match self {
            Self::Init => "init",
            Self::Attach { .. } => "attach",
            Self::Detach { .. } => "detach",
            Self::WaitForAttach { .. } => "waitforattach",
            Self::IsAttached { .. } => "isattached",
            Self::MountDevice { .. } => "mountdevice",
            Self::UnmountDevice { .. } => "unmountdevice",
            Self::GetVolumeName { .. } => "getvolumename",
            Self::Mount { .. } => "mount",
            Self::Unmount { .. } => "unmount",
            Self::Unsupported(name) => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mountdevice() {
        let cmd = DriverCommand::parse(&["mountdevice", "/mnt/x", "/dev/sdb", "{}"]).unwrap();
        assert_eq!(
            cmd,
            DriverCommand::MountDevice {
                mount_dir: "/mnt/x".to_string(),
                device: "/dev/sdb".to_string(),
                options: "{}".to_string(),
            }
        );
        assert_eq!(cmd.name(), "mountdevice");
    }

    #[test]
    fn test_parse_init_ignores_extra_args() {
        assert_eq!(
            DriverCommand::parse(&["init", "unused"]).unwrap(),
            DriverCommand::Init
        );
    }

    #[test]
    fn test_missing_argument_is_validation_error() {
        let err = DriverCommand::parse(&["attach", "{}"]).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("node name"));
    }

    #[test]
    fn test_empty_args() {
        let args: [&str; 0] = [];
        assert!(DriverCommand::parse(&args).is_err());
    }

    #[test]
    fn test_unknown_command_is_unsupported() {
        let cmd = DriverCommand::parse(&["expandvolume", "{}"]).unwrap();
        assert_eq!(cmd, DriverCommand::Unsupported("expandvolume".to_string()));
        assert_eq!(cmd.name(), "expandvolume");
    }
}
