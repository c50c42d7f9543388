use log::{debug, error, info};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::devices::{Sensor, SmartDisplay};
use crate::modbus::ModbusClientTrait;
use crate::utils::error::{ConfigError, MonitorError, SensorError};

/// Result of one sense-then-publish cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Published { temperature: i16, humidity: u16 },
    /// Transient sensor failure; nothing was written this cycle.
    Skipped(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub published: u64,
    pub skipped: u64,
}

/// The polling loop. Owns the sensor and the Modbus session exclusively.
pub struct MonitorService {
    sensor: Box<dyn Sensor>,
    client: Box<dyn ModbusClientTrait>,
    display: SmartDisplay,
    poll_interval: Duration,
}

impl MonitorService {
    pub fn new(
        config: &Config,
        sensor: Box<dyn Sensor>,
        client: Box<dyn ModbusClientTrait>,
    ) -> Result<Self, ConfigError> {
        let display = SmartDisplay::from_config(config)?;
        Ok(Self::with_display(display, sensor, client, config.poll_interval()))
    }

    pub fn with_display(
        display: SmartDisplay,
        sensor: Box<dyn Sensor>,
        client: Box<dyn ModbusClientTrait>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            sensor,
            client,
            display,
            poll_interval,
        }
    }

    /// Read one sample and publish it. Transient sensor errors skip the
    /// cycle; everything else, including a sample with a missing value, is
    /// returned.
    pub async fn poll_once(&mut self) -> Result<CycleOutcome, MonitorError> {
        let sample = match self.sensor.read_sample().await {
            Ok(sample) => sample,
            Err(e) if e.is_transient() => {
                debug!("Skipping cycle: {}", e);
                return Ok(CycleOutcome::Skipped(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let Some((temperature, humidity)) = sample.values() else {
            return Err(SensorError::Fatal(format!("incomplete sample {}", sample)).into());
        };

        self.display
            .show_sample(self.client.as_mut(), temperature, humidity)
            .await?;
        debug!("📊 Published {}", sample);

        Ok(CycleOutcome::Published {
            temperature,
            humidity,
        })
    }

    /// Poll until `shutdown` turns true (or its sender goes away).
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<RunSummary, MonitorError> {
        self.run_for(shutdown, None).await
    }

    /// Like [`run`](Self::run), stopping after `max_cycles` cycles when set.
    /// The delay is added after each cycle; cycle duration is not subtracted.
    pub async fn run_for(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
        max_cycles: Option<u64>,
    ) -> Result<RunSummary, MonitorError> {
        info!(
            "🔄 Starting monitor: sensor {}, interval {:?}",
            self.sensor.name(),
            self.poll_interval
        );

        let mut summary = RunSummary::default();
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll_once().await {
                Ok(CycleOutcome::Published { .. }) => summary.published += 1,
                Ok(CycleOutcome::Skipped(_)) => summary.skipped += 1,
                Err(e) => {
                    error!("❌ Monitor stopped after {} cycles: {}", summary.cycles, e);
                    return Err(e);
                }
            }
            summary.cycles += 1;

            if max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            "🛑 Monitor stopped: {} cycles, {} published, {} skipped",
            summary.cycles, summary.published, summary.skipped
        );
        Ok(summary)
    }
}
