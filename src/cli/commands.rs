use clap::builder::PossibleValuesParser;
use clap::error::ErrorKind;
use clap::{value_parser, Arg, ArgMatches, Command};
use log::warn;

use crate::utils::error::ConfigError;

pub const BAUD_USAGE: &str = "Wrong usage of the -b option. Use -b9600";
pub const PORT_USAGE: &str = "Wrong usage of the -D option. Use -D/dev/ttyUSB0 or -DCOM4";

pub fn build_cli() -> Command {
    Command::new("smartdisplay-monitor")
        .version(crate::VERSION)
        .about("Publishes DHT11 temperature/humidity readings to a SmartDisplay over Modbus")
        .args_override_self(true)
        .arg(
            Arg::new("framing")
                .long("framing")
                .value_name("MODE")
                .value_parser(PossibleValuesParser::new(["rtu", "ascii"]))
                .help("Modbus framing (-rtu / -ascii)"),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .value_name("RATE")
                .help("Baud rate, e.g. -b115200"),
        )
        .arg(
            Arg::new("port")
                .short('D')
                .value_name("PATH")
                .help("Serial device, e.g. -D/dev/ttyUSB0 or -DCOM4"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("Response timeout; derived from framing and baud rate when omitted"),
        )
        .arg(
            Arg::new("interval-ms")
                .long("interval-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("Delay between polling cycles"),
        )
        .arg(
            Arg::new("sensor")
                .long("sensor")
                .value_name("DIR")
                .help("IIO device directory of the DHT11, e.g. /sys/bus/iio/devices/iio:device0"),
        )
}

/// Rewrite the legacy single-dash words (`-rtu`, `-ascii`) into long options
/// and reject `-b` / `-D` without an attached value. Words are matched by
/// prefix, so `-rtu115` still selects RTU. Anything unrecognised is dropped
/// with a warning.
pub fn normalize_legacy_args<I, T>(args: I) -> Result<Vec<String>, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let cli = build_cli();
    let takes_value = |name: &str| cli.get_arguments().any(|a| a.get_long() == Some(name));

    let mut args = args.into_iter().map(Into::into);
    let mut normalized: Vec<String> = args.next().into_iter().collect();
    let mut value_pending = false;

    for arg in args {
        if value_pending {
            value_pending = false;
            normalized.push(arg);
        } else if let Some(long) = arg.strip_prefix("--") {
            let (name, inline_value) = match long.split_once('=') {
                Some((name, _)) => (name, true),
                None => (long, false),
            };
            if name == "help" || name == "version" {
                normalized.push(arg);
            } else if takes_value(name) {
                value_pending = !inline_value;
                normalized.push(arg);
            } else {
                warn!("Ignoring unknown option {}", arg);
            }
        } else if arg == "-h" || arg == "-V" {
            normalized.push(arg);
        } else if arg.starts_with("-ascii") {
            normalized.push("--framing=ascii".to_string());
        } else if arg.starts_with("-rtu") {
            normalized.push("--framing=rtu".to_string());
        } else if arg.starts_with("-b") {
            if arg.len() < 3 {
                return Err(ConfigError::Usage(BAUD_USAGE.to_string()));
            }
            normalized.push(arg);
        } else if arg.starts_with("-D") {
            if arg.len() < 3 {
                return Err(ConfigError::Usage(PORT_USAGE.to_string()));
            }
            normalized.push(arg);
        } else {
            warn!("Ignoring unknown argument {}", arg);
        }
    }

    Ok(normalized)
}

/// Parse the process arguments. Help and version requests print and exit
/// through clap; a malformed known option becomes a usage error.
pub fn parse_args<I, T>(args: I) -> Result<ArgMatches, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let args = normalize_legacy_args(args)?;
    match build_cli().try_get_matches_from(args) {
        Ok(matches) => Ok(matches),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => Err(ConfigError::Usage(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_flags() {
        let matches = parse_args(["smartdisplay-monitor", "-ascii", "-b2400", "-D/dev/ttyAMA0"]).unwrap();
        assert_eq!(matches.get_one::<String>("framing").unwrap(), "ascii");
        assert_eq!(matches.get_one::<String>("baud").unwrap(), "2400");
        assert_eq!(matches.get_one::<String>("port").unwrap(), "/dev/ttyAMA0");
    }

    #[test]
    fn test_last_framing_flag_wins() {
        let matches = parse_args(["smartdisplay-monitor", "-ascii", "-rtu"]).unwrap();
        assert_eq!(matches.get_one::<String>("framing").unwrap(), "rtu");
    }

    #[test]
    fn test_prefix_matching() {
        let args = normalize_legacy_args(["prog", "-asciiXYZ", "-rtu1"]).unwrap();
        assert_eq!(args, vec!["prog", "--framing=ascii", "--framing=rtu"]);
    }

    #[test]
    fn test_baud_without_digits_is_usage_error() {
        let err = parse_args(["smartdisplay-monitor", "-b"]).unwrap_err();
        assert!(matches!(err, ConfigError::Usage(ref msg) if msg == BAUD_USAGE));
    }

    #[test]
    fn test_port_without_path_is_usage_error() {
        let err = parse_args(["smartdisplay-monitor", "-rtu", "-D"]).unwrap_err();
        assert!(matches!(err, ConfigError::Usage(ref msg) if msg == PORT_USAGE));
    }

    #[test]
    fn test_unknown_arguments_are_ignored() {
        let matches = parse_args([
            "smartdisplay-monitor",
            "--bogus",
            "stray",
            "-x",
            "--config",
            "/etc/smartdisplay.toml",
            "--verbose=2",
            "-b9600",
        ])
        .unwrap();
        assert_eq!(matches.get_one::<String>("baud").unwrap(), "9600");
        assert_eq!(matches.get_one::<String>("config").unwrap(), "/etc/smartdisplay.toml");
    }

    #[test]
    fn test_bad_value_of_known_option_is_usage_error() {
        let err = parse_args(["smartdisplay-monitor", "--framing=modbus"]).unwrap_err();
        assert!(matches!(err, ConfigError::Usage(_)));
    }
}
