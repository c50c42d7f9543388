pub mod dht11;
pub mod smart_display;
pub mod traits;

pub use dht11::Dht11Sensor;
pub use smart_display::{RegisterMap, SmartDisplay, WidgetField};
pub use traits::{Sample, Sensor};
