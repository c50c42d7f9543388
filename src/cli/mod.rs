pub mod commands;

pub use commands::{build_cli, normalize_legacy_args, parse_args};
