use clap::{Args, Parser};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pico-scope",
    about = "Run a measurement on a 1-bit Pico scope and print the edges as CSV"
)]
pub struct Cli {
    /// Serial interface name (e.g. /dev/ttyACM0)
    pub dev: String,
    /// Number of points to request from the device
    #[arg(default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub points: u64,
    #[command(flatten)]
    pub ser: SerialOpts,
    #[command(flatten)]
    pub timing: TimingOpts,
    /// Log every write and framed read
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Baud rate
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,
    /// Enable RTS/CTS
    #[arg(long, default_value_t = false)]
    pub rtscts: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TimingOpts {
    /// Read timeout for prompts, acknowledgements and lines
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,
    /// Write timeout
    #[arg(long, default_value_t = 5000)]
    pub write_timeout_ms: u64,
    /// How long to wait for the device to finish acquiring
    #[arg(long, default_value_t = 60_000)]
    pub acquire_timeout_ms: u64,
}

impl TimingOpts {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["pico-scope", "/dev/ttyACM0"]).unwrap();
        assert_eq!(cli.dev, "/dev/ttyACM0");
        assert_eq!(cli.ser.baud, 115_200);
        assert_eq!(cli.points, 1000);
        assert_eq!(cli.timing.read_timeout(), Duration::from_secs(1));
        assert_eq!(cli.timing.write_timeout(), Duration::from_secs(5));
        assert_eq!(cli.timing.acquire_timeout(), Duration::from_secs(60));
        assert!(!cli.debug);
    }

    #[test]
    fn explicit_points() {
        let cli = Cli::try_parse_from(["pico-scope", "/dev/ttyUSB1", "250"]).unwrap();
        assert_eq!(cli.points, 250);
    }

    #[test]
    fn rejects_zero_points_and_missing_interface() {
        assert!(Cli::try_parse_from(["pico-scope", "/dev/ttyUSB1", "0"]).is_err());
        let err = Cli::try_parse_from(["pico-scope"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
