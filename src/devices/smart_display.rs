use log::info;

use crate::config::Config;
use crate::modbus::client::ModbusClientTrait;
use crate::utils::error::{ConfigError, ModbusError};

/// Highest widget index the display firmware supports.
pub const MAX_WIDGET: u8 = 63;

/// Per-widget register offsets, each one 16-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetField {
    Type = 0,
    PosX = 2,
    PosY = 3,
    Style = 4,
    SetValue = 6,
    GetValue = 7,
}

/// Base register of widget `n`: `n * 100` for 0-9, `n * 100 + 10000` for 10-63.
pub fn widget_base(widget: u8) -> Result<u16, ConfigError> {
    match widget {
        0..=9 => Ok(widget as u16 * 100),
        10..=MAX_WIDGET => Ok(widget as u16 * 100 + 10_000),
        _ => Err(ConfigError::Invalid(format!(
            "widget {} outside 0-{}",
            widget, MAX_WIDGET
        ))),
    }
}

pub fn widget_register(widget: u8, field: WidgetField) -> Result<u16, ConfigError> {
    Ok(widget_base(widget)? + field as u16)
}

/// Fixed addresses of the two published quantities, resolved once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    pub temperature: u16,
    pub humidity: u16,
}

impl RegisterMap {
    pub fn from_widgets(temperature_widget: u8, humidity_widget: u8) -> Result<Self, ConfigError> {
        Ok(Self {
            temperature: widget_register(temperature_widget, WidgetField::SetValue)?,
            humidity: widget_register(humidity_widget, WidgetField::SetValue)?,
        })
    }
}

/// SmartDisplay slave: maps temperature and humidity onto the "set value"
/// registers of two number widgets.
#[derive(Debug, Clone)]
pub struct SmartDisplay {
    slave_id: u8,
    registers: RegisterMap,
}

impl SmartDisplay {
    pub fn new(slave_id: u8, registers: RegisterMap) -> Self {
        Self {
            slave_id,
            registers,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let registers = RegisterMap::from_widgets(config.temperature_widget, config.humidity_widget)?;
        info!(
            "🖥️  SmartDisplay 0x{:02x}: temperature -> register {}, humidity -> register {}",
            config.slave_id, registers.temperature, registers.humidity
        );
        Ok(Self::new(config.slave_id, registers))
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub fn registers(&self) -> RegisterMap {
        self.registers
    }

    pub async fn write_register(
        &self,
        client: &mut dyn ModbusClientTrait,
        address: u16,
        value: u16,
    ) -> Result<(), ModbusError> {
        client.write_single_register(self.slave_id, address, value).await
    }

    /// Signed values travel as 16-bit two's complement.
    pub async fn write_temperature(
        &self,
        client: &mut dyn ModbusClientTrait,
        celsius: i16,
    ) -> Result<(), ModbusError> {
        self.write_register(client, self.registers.temperature, celsius as u16)
            .await
    }

    pub async fn write_humidity(
        &self,
        client: &mut dyn ModbusClientTrait,
        percent: u16,
    ) -> Result<(), ModbusError> {
        self.write_register(client, self.registers.humidity, percent).await
    }

    /// Temperature first, then humidity. Stops at the first failure.
    pub async fn show_sample(
        &self,
        client: &mut dyn ModbusClientTrait,
        celsius: i16,
        percent: u16,
    ) -> Result<(), ModbusError> {
        self.write_temperature(client, celsius).await?;
        self.write_humidity(client, percent).await
    }
}
