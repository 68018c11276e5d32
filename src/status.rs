//! Result envelope written to stdout for every command

use serde::Serialize;

/// Outcome of a driver command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Success,
    Failure,
    #[serde(rename = "Not supported")]
    NotSupported,
}

/// Capabilities reported by `init`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriverCapabilities {
    pub attach: bool,
    #[serde(rename = "selinuxRelabel")]
    pub selinux_relabel: bool,
}

/// The structured response of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStatus {
    pub status: Status,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(rename = "device", skip_serializing_if = "Option::is_none")]
    pub device_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<DriverCapabilities>,
}

impl DriverStatus {
    fn with_status(status: Status) -> Self {
        Self {
            status,
            message: String::new(),
            device_path: None,
            volume_name: None,
            attached: None,
            capabilities: None,
        }
    }

    /// Successful result with no extra fields
    pub fn success() -> Self {
        Self::with_status(Status::Success)
    }

    /// Failed result carrying the error text
    pub fn failure(message: impl Into<String>) -> Self {
        Self::with_status(Status::Failure).message(message)
    }

    /// Tells the kubelet to fall back to its own handling
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::with_status(Status::NotSupported).message(message)
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn device_path(mut self, device: impl Into<String>) -> Self {
        self.device_path = Some(device.into());
        self
    }

    pub fn volume_name(mut self, name: impl Into<String>) -> Self {
        self.volume_name = Some(name.into());
        self
    }

    pub fn attached(mut self, attached: bool) -> Self {
        self.attached = Some(attached);
        self
    }

    pub fn capabilities(mut self, capabilities: DriverCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Whether the status is `Success`
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Serialize to the single-line JSON the kubelet expects
    pub fn to_json(&self) -> String {
        // Only strings, bools and unit variants: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"Failure","message":"could not encode driver status"}"#.to_string()
        })
    }
}
