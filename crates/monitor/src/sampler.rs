//! Power reading capability and the Tapo smart plug adapter.
//!
//! The supervisor only sees the [`DeviceConnector`] / [`PowerSampler`]
//! traits. [`TapoConnector`] pairs with P110 energy-monitoring plugs over
//! the LAN; tests substitute in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use tapo::{ApiClient, PlugEnergyMonitoringHandler};

use crate::config::{DeviceConfig, TapoConfig};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A single failed power reading. Never fatal on its own.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Device request failed: {0}")]
    Request(String),

    #[error("Device did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Device reported no current power value")]
    MissingPower,
}

/// A device could not be paired or connected at startup.
#[derive(Debug, thiserror::Error)]
#[error("Failed to connect to {label} at {address}: {reason}")]
pub struct SetupError {
    pub label: String,
    pub address: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Reads the current power draw of one device.
#[async_trait]
pub trait PowerSampler: Send + Sync {
    /// Current draw in watts.
    async fn read(&self) -> Result<f64, ReadError>;
}

/// Establishes a [`PowerSampler`] for a configured device.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, device: &DeviceConfig) -> Result<Box<dyn PowerSampler>, SetupError>;
}

// ---------------------------------------------------------------------------
// Tapo adapter
// ---------------------------------------------------------------------------

/// Pairs with Tapo P110 plugs using the account credentials.
pub struct TapoConnector {
    client: ApiClient,
    timeout: Duration,
}

impl TapoConnector {
    pub fn new(config: &TapoConfig) -> Self {
        Self {
            client: ApiClient::new(config.username.clone(), config.password.clone()),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl DeviceConnector for TapoConnector {
    async fn connect(&self, device: &DeviceConfig) -> Result<Box<dyn PowerSampler>, SetupError> {
        tracing::info!(device = %device.label, address = %device.address, "Pairing with smart plug");

        let handshake = self.client.clone().p110(device.address.clone());
        let plug = match tokio::time::timeout(self.timeout, handshake).await {
            Ok(Ok(plug)) => plug,
            Ok(Err(e)) => {
                return Err(SetupError {
                    label: device.label.clone(),
                    address: device.address.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SetupError {
                    label: device.label.clone(),
                    address: device.address.clone(),
                    reason: format!("no response within {}s", self.timeout.as_secs()),
                })
            }
        };

        tracing::info!(device = %device.label, "Smart plug connected");

        Ok(Box::new(TapoSampler {
            plug,
            timeout: self.timeout,
        }))
    }
}

/// Reads instantaneous power from a connected P110 plug.
pub struct TapoSampler {
    plug: PlugEnergyMonitoringHandler,
    timeout: Duration,
}

#[async_trait]
impl PowerSampler for TapoSampler {
    async fn read(&self) -> Result<f64, ReadError> {
        match tokio::time::timeout(self.timeout, self.plug.get_energy_usage()).await {
            Ok(Ok(usage)) => usage
                .current_power
                .map(milliwatts_to_watts)
                .ok_or(ReadError::MissingPower),
            Ok(Err(e)) => Err(ReadError::Request(e.to_string())),
            Err(_) => Err(ReadError::Timeout(self.timeout)),
        }
    }
}

/// The plug reports energy usage in milliwatts.
fn milliwatts_to_watts(milliwatts: u64) -> f64 {
    milliwatts as f64 / 1000.0
}
