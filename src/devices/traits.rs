use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::utils::error::SensorError;

/// One poll cycle's reading. Either value may be missing when the sensor
/// answered without a usable measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub temperature: Option<i16>,
    pub humidity: Option<u16>,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(temperature: Option<i16>, humidity: Option<u16>) -> Self {
        Self {
            temperature,
            humidity,
            timestamp: Utc::now(),
        }
    }

    /// Both values, if present.
    pub fn values(&self) -> Option<(i16, u16)> {
        Some((self.temperature?, self.humidity?))
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let temp = self
            .temperature
            .map(|t| format!("{}°C", t))
            .unwrap_or_else(|| "--".to_string());
        let humidity = self
            .humidity
            .map(|h| format!("{}%", h))
            .unwrap_or_else(|| "--".to_string());
        write!(f, "{} {} @ {}", temp, humidity, self.timestamp.format("%H:%M:%S"))
    }
}

#[async_trait]
pub trait Sensor: Send {
    fn name(&self) -> &str;

    async fn read_sample(&mut self) -> Result<Sample, SensorError>;
}
