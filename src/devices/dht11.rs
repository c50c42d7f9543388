//! DHT11 through the Linux `dht11` IIO driver.
//!
//! With `dtoverlay=dht11,gpiopin=12` the kernel exposes the sensor under
//! `/sys/bus/iio/devices/iio:deviceN/`. Every attribute read triggers a
//! conversion; the driver answers glitches (bad checksum, short pulse
//! train) with `EIO` or `ETIMEDOUT`.

use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};

use super::traits::{Sample, Sensor};
use crate::utils::error::{ConfigError, SensorError};

pub const IIO_DEVICES_DIR: &str = "/sys/bus/iio/devices";
const DRIVER_NAME: &str = "dht11";
const TEMPERATURE_ATTR: &str = "in_temp_input";
const HUMIDITY_ATTR: &str = "in_humidityrelative_input";

#[derive(Debug, Clone)]
pub struct Dht11Sensor {
    device_dir: PathBuf,
    name: String,
}

impl Dht11Sensor {
    /// Use an explicit IIO device directory, or the first `dht11` device
    /// found under `/sys/bus/iio/devices`.
    pub fn open(device_dir: Option<&str>) -> Result<Self, ConfigError> {
        let device_dir = match device_dir {
            Some(dir) => PathBuf::from(dir),
            None => Self::discover(Path::new(IIO_DEVICES_DIR))?,
        };

        if !device_dir.join(TEMPERATURE_ATTR).exists() || !device_dir.join(HUMIDITY_ATTR).exists() {
            return Err(ConfigError::Unavailable {
                what: "DHT11 sensor".to_string(),
                reason: format!(
                    "{} lacks {} / {}",
                    device_dir.display(),
                    TEMPERATURE_ATTR,
                    HUMIDITY_ATTR
                ),
            });
        }

        let name = format!("{} ({})", DRIVER_NAME, device_dir.display());
        info!("🌡️  Using sensor {}", name);
        Ok(Self { device_dir, name })
    }

    pub fn discover(iio_root: &Path) -> Result<PathBuf, ConfigError> {
        let unavailable = |reason: String| ConfigError::Unavailable {
            what: "DHT11 sensor".to_string(),
            reason,
        };

        let entries = std::fs::read_dir(iio_root)
            .map_err(|e| unavailable(format!("{}: {}", iio_root.display(), e)))?;

        let mut candidates: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                std::fs::read_to_string(path.join("name"))
                    .map(|s| s.trim() == DRIVER_NAME)
                    .unwrap_or(false)
            })
            .collect();
        candidates.sort();

        candidates.into_iter().next().ok_or_else(|| {
            unavailable(format!(
                "no IIO device named '{}' under {}",
                DRIVER_NAME,
                iio_root.display()
            ))
        })
    }

    async fn read_milli(&self, attr: &str) -> Result<i64, SensorError> {
        let path = self.device_dir.join(attr);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SensorError::from_io(attr, e))?;
        // A torn read shows up as garbage, not as an I/O error
        raw.trim()
            .parse::<i64>()
            .map_err(|_| SensorError::Transient(format!("{}: unparsable value {:?}", attr, raw.trim())))
    }
}

fn milli_to_unit(milli: i64) -> i64 {
    (milli as f64 / 1000.0).round() as i64
}

#[async_trait]
impl Sensor for Dht11Sensor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_sample(&mut self) -> Result<Sample, SensorError> {
        let temp_milli = self.read_milli(TEMPERATURE_ATTR).await?;
        let humidity_milli = self.read_milli(HUMIDITY_ATTR).await?;

        debug!("🌡️  Raw reading: {} m°C, {} m%", temp_milli, humidity_milli);

        // Out-of-range values mean a broken sensor
        let temperature = i16::try_from(milli_to_unit(temp_milli)).map_err(|_| {
            SensorError::Fatal(format!("{}: {} out of range", TEMPERATURE_ATTR, temp_milli))
        })?;
        let humidity = u16::try_from(milli_to_unit(humidity_milli))
            .ok()
            .filter(|h| *h <= 100)
            .ok_or_else(|| {
                SensorError::Fatal(format!("{}: {} out of range", HUMIDITY_ATTR, humidity_milli))
            })?;

        Ok(Sample::new(Some(temperature), Some(humidity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_iio_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "smartdisplay-iio-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("iio:device0")).unwrap();
        fs::write(root.join("iio:device0/name"), "rp2040-adc\n").unwrap();
        fs::create_dir_all(root.join("iio:device1")).unwrap();
        fs::write(root.join("iio:device1/name"), "dht11\n").unwrap();
        root
    }

    #[test]
    fn test_discover_finds_dht11() {
        let root = fake_iio_root("discover");
        assert_eq!(Dht11Sensor::discover(&root).unwrap(), root.join("iio:device1"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_open_requires_attributes() {
        let root = fake_iio_root("open");
        let dir = root.join("iio:device1");
        let err = Dht11Sensor::open(dir.to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::Unavailable { .. }));
        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_read_sample() {
        let root = fake_iio_root("read");
        let dir = root.join("iio:device1");
        fs::write(dir.join(TEMPERATURE_ATTR), "23000\n").unwrap();
        fs::write(dir.join(HUMIDITY_ATTR), "41000\n").unwrap();

        let mut sensor = Dht11Sensor::open(dir.to_str()).unwrap();
        let sample = sensor.read_sample().await.unwrap();
        assert_eq!(sample.values(), Some((23, 41)));

        fs::write(dir.join(TEMPERATURE_ATTR), "-4600\n").unwrap();
        let sample = sensor.read_sample().await.unwrap();
        assert_eq!(sample.temperature, Some(-5));

        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_garbage_is_transient_and_missing_is_fatal() {
        let root = fake_iio_root("errors");
        let dir = root.join("iio:device1");
        fs::write(dir.join(TEMPERATURE_ATTR), "\n").unwrap();
        fs::write(dir.join(HUMIDITY_ATTR), "41000\n").unwrap();

        let mut sensor = Dht11Sensor::open(dir.to_str()).unwrap();
        assert!(sensor.read_sample().await.unwrap_err().is_transient());

        fs::remove_file(dir.join(TEMPERATURE_ATTR)).unwrap();
        assert!(!sensor.read_sample().await.unwrap_err().is_transient());

        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_out_of_range_reading_is_fatal() {
        let root = fake_iio_root("range");
        let dir = root.join("iio:device1");
        fs::write(dir.join(TEMPERATURE_ATTR), "21000\n").unwrap();
        fs::write(dir.join(HUMIDITY_ATTR), "255000\n").unwrap();

        let mut sensor = Dht11Sensor::open(dir.to_str()).unwrap();
        let err = sensor.read_sample().await.unwrap_err();
        assert!(matches!(err, SensorError::Fatal(ref msg) if msg.contains(HUMIDITY_ATTR)));

        fs::write(dir.join(HUMIDITY_ATTR), "40000\n").unwrap();
        fs::write(dir.join(TEMPERATURE_ATTR), "40000000\n").unwrap();
        let err = sensor.read_sample().await.unwrap_err();
        assert!(matches!(err, SensorError::Fatal(ref msg) if msg.contains(TEMPERATURE_ATTR)));

        fs::remove_dir_all(&root).unwrap();
    }
}
