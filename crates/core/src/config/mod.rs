use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Name of the window-level event that carries a [`crate::FireConfig`].
pub const DEFAULT_BROADCAST_EVENT: &str = "confetti";

/// Top-level runtime settings for the controller and the event bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfettiSettings {
    pub controller: ControllerConfig,
    pub bridge: BridgeConfig,
}

impl ConfettiSettings {
    /// Parses settings from JSON text. Missing sections keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a JSON settings file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// What happens when an element fires while one of its sessions still runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefirePolicy {
    /// Sessions run independently and their emissions interleave.
    #[default]
    Overlap,
    /// The element's running sessions are cancelled before the new one starts.
    SingleFlight,
}

/// Configuration specific to the fire controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerConfig {
    pub refire: RefirePolicy,
}

/// Configuration specific to the event bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub broadcast_event: String,
    pub preload: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broadcast_event: DEFAULT_BROADCAST_EVENT.to_string(),
            preload: true,
        }
    }
}
