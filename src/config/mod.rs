pub mod settings;

pub use settings::{
    Config,
    ParityConfig,
    DEFAULT_BAUDRATE,
    DEFAULT_PORT_NAME,
    SMARTDISPLAY_SLAVE_ID,
};
