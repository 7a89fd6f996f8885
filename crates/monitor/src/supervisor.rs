//! Device connection and the per-device monitoring loops.
//!
//! [`start`] pairs with every configured device, refusing to monitor any of
//! them unless all connect. It then spawns one task per device. Each task
//! owns its [`FinishDetector`] exclusively and runs read → observe → notify
//! → sleep until cancelled.
//!
//! Failures are isolated per device: if one loop errors out or panics, a
//! crash notification is queued and the remaining devices keep running.

use std::any::Any;

use futures::stream::{FuturesUnordered, StreamExt};
use laundry_core::{FinishDetector, Transition};
use tokio_util::sync::CancellationToken;

use crate::config::{DeviceConfig, MonitorConfig};
use crate::notify::{self, Notifier, MONITOR_LABEL};
use crate::sampler::{DeviceConnector, PowerSampler, SetupError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// One or more devices could not be connected at startup.
    #[error("{}", describe_setup_failures(.0))]
    Setup(Vec<SetupError>),

    #[error("gave up after {failures} consecutive failed reads")]
    ReadFailuresExceeded { failures: u32 },

    #[error("monitor task panicked: {0}")]
    Panicked(String),

    #[error("monitor task was aborted")]
    Aborted,
}

fn describe_setup_failures(failures: &[SetupError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A configured device paired with its live sampler.
pub struct ConnectedDevice {
    pub config: DeviceConfig,
    pub sampler: Box<dyn PowerSampler>,
}

/// Outcome of a monitoring run once every device loop has ended.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Labels of the devices whose loops crashed.
    pub crashed: Vec<String>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Connect every device, announce startup, and monitor until all device
/// loops have ended.
///
/// A setup failure is logged, notified best-effort, and returned; no device
/// is monitored in that case.
pub async fn start(
    config: &MonitorConfig,
    connector: &dyn DeviceConnector,
    notifier: Notifier,
    cancel: CancellationToken,
) -> Result<RunReport, MonitorError> {
    let devices = match connect_all(connector, &config.devices).await {
        Ok(devices) => devices,
        Err(e) => {
            tracing::error!(error = %e, "Device setup failed, not starting monitoring");
            notifier.notify(notify::setup_failed_message(&e), MONITOR_LABEL);
            return Err(e);
        }
    };

    let labels: Vec<&str> = config.devices.iter().map(|d| d.label.as_str()).collect();
    tracing::info!(devices = ?labels, "All devices connected");
    notifier.notify(notify::started_message(&labels), MONITOR_LABEL);

    Ok(run(
        devices,
        notifier,
        config.max_consecutive_read_failures,
        cancel,
    )
    .await)
}

/// Connect all devices concurrently.
///
/// Succeeds only if every device connects; otherwise every failure is
/// collected into [`MonitorError::Setup`].
pub async fn connect_all(
    connector: &dyn DeviceConnector,
    devices: &[DeviceConfig],
) -> Result<Vec<ConnectedDevice>, MonitorError> {
    let attempts = futures::future::join_all(
        devices
            .iter()
            .map(|device| async move { (device, connector.connect(device).await) }),
    )
    .await;

    let mut connected = Vec::with_capacity(devices.len());
    let mut failures = Vec::new();

    for (device, attempt) in attempts {
        match attempt {
            Ok(sampler) => connected.push(ConnectedDevice {
                config: device.clone(),
                sampler,
            }),
            Err(e) => {
                tracing::error!(device = %device.label, error = %e, "Device connection failed");
                failures.push(e);
            }
        }
    }

    if failures.is_empty() {
        Ok(connected)
    } else {
        Err(MonitorError::Setup(failures))
    }
}

/// Spawn one monitoring task per device and wait for all of them to end.
pub async fn run(
    devices: Vec<ConnectedDevice>,
    notifier: Notifier,
    max_consecutive_read_failures: Option<u32>,
    cancel: CancellationToken,
) -> RunReport {
    let mut tasks = FuturesUnordered::new();

    for device in devices {
        let label = device.config.label.clone();
        let handle = tokio::spawn(monitor_device(
            device,
            notifier.clone(),
            max_consecutive_read_failures,
            cancel.clone(),
        ));
        tasks.push(async move { (label, handle.await) });
    }

    let mut report = RunReport::default();

    while let Some((label, joined)) = tasks.next().await {
        let outcome = match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(MonitorError::Panicked(panic_message(e.into_panic()))),
            Err(_) => Err(MonitorError::Aborted),
        };

        match outcome {
            Ok(()) => tracing::info!(device = %label, "Monitoring stopped"),
            Err(e) => {
                tracing::error!(
                    device = %label,
                    error = %e,
                    "Monitoring crashed, remaining devices continue",
                );
                notifier.notify(notify::crashed_message(&label, &e), label.clone());
                report.crashed.push(label);
            }
        }
    }

    report
}

// ---------------------------------------------------------------------------
// Device loop
// ---------------------------------------------------------------------------

/// Sample one device until cancelled.
///
/// A failed read skips the tick without touching detector state. With a
/// failure limit configured, that many failures in a row abandon the device.
async fn monitor_device(
    device: ConnectedDevice,
    notifier: Notifier,
    max_consecutive_read_failures: Option<u32>,
    cancel: CancellationToken,
) -> Result<(), MonitorError> {
    let ConnectedDevice { config, sampler } = device;
    let label = config.label.as_str();
    let interval = config.detector.sample_interval;
    let mut detector = FinishDetector::new(config.detector.clone());
    let mut consecutive_failures: u32 = 0;

    tracing::info!(
        device = label,
        high_threshold_watts = config.detector.high_threshold_watts,
        low_threshold_watts = config.detector.low_threshold_watts,
        arm_debounce = config.detector.arm_debounce,
        finish_debounce = config.detector.finish_debounce,
        interval_secs = interval.as_secs_f64(),
        time_to_arm_secs = config.detector.time_to_arm().as_secs(),
        time_to_finish_secs = config.detector.time_to_finish().as_secs(),
        "Monitoring started",
    );

    loop {
        let reading = tokio::select! {
            _ = cancel.cancelled() => break,
            reading = sampler.read() => reading,
        };

        match reading {
            Ok(power) => {
                consecutive_failures = 0;
                tracing::info!(device = label, power_watts = power, "Power reading");

                match detector.observe(power) {
                    Some(Transition::Armed) => {
                        tracing::info!(device = label, power_watts = power, "Armed (sustained high power)");
                    }
                    Some(Transition::Finished) => {
                        tracing::info!(device = label, power_watts = power, "Disarmed (sustained low power), cycle finished");
                        notifier.notify(notify::finished_message(label), label);
                    }
                    None => {}
                }
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                tracing::warn!(
                    device = label,
                    error = %e,
                    consecutive_failures,
                    "Error reading power, skipping sample",
                );

                if let Some(limit) = max_consecutive_read_failures {
                    if consecutive_failures >= limit {
                        return Err(MonitorError::ReadFailuresExceeded {
                            failures: consecutive_failures,
                        });
                    }
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!(device = label, armed = detector.is_armed(), "Monitoring cancelled");
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extracts_strings() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic payload");
    }

    #[test]
    fn setup_error_lists_every_device() {
        let err = MonitorError::Setup(vec![
            SetupError {
                label: "Washer".to_string(),
                address: "10.0.0.1".to_string(),
                reason: "timeout".to_string(),
            },
            SetupError {
                label: "Dryer".to_string(),
                address: "10.0.0.2".to_string(),
                reason: "bad credentials".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Failed to connect to Washer at 10.0.0.1: timeout; \
             Failed to connect to Dryer at 10.0.0.2: bad credentials"
        );
    }
}
