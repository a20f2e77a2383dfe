use crate::error::{AvrError, Result};
use serde::{Deserialize, Serialize};

/// Configuration of one receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Unique identifier of the device (MAC address)
    pub identifier: String,

    /// Friendly name of the device
    #[serde(default)]
    pub name: String,

    /// IP address of the device
    #[serde(default)]
    pub address: String,

    /// Step used by relative volume commands instead of the descriptor's step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_step: Option<f64>,

    /// Expose a remote entity for zones with cursor or menu commands
    #[serde(default = "default_expose_remote")]
    pub expose_remote: bool,
}

fn default_expose_remote() -> bool {
    true
}

impl ReceiverConfig {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            address: address.into(),
            volume_step: None,
            expose_remote: true,
        }
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: ReceiverConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the identifier can be used in entity ids
    pub fn validate(&self) -> Result<()> {
        if self.identifier.trim().is_empty() {
            return Err(AvrError::InvalidConfig("identifier must not be empty".to_string()));
        }
        Ok(())
    }

    /// Configured volume step, ignoring non-positive values
    pub fn effective_volume_step(&self) -> Option<f64> {
        match self.volume_step {
            Some(step) if step.is_finite() && step > 0.0 => Some(step),
            Some(step) => {
                tracing::warn!("Ignoring invalid volume step {} for {}", step, self.identifier);
                None
            }
            None => None,
        }
    }

    /// Name used in log messages
    pub fn log_id(&self) -> &str {
        if self.name.is_empty() {
            &self.identifier
        } else {
            &self.name
        }
    }
}
