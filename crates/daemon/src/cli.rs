//! Command-line front-end.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "siprecd",
    version,
    about = "active-recording SIP media-anchoring daemon"
)]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level regardless of the configured level.
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_path_and_verbose_flag() {
        let cli = Cli::parse_from(["siprecd", "--config", "/etc/siprec.json", "-v"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/siprec.json")));
        assert!(cli.verbose);
    }

    #[test]
    fn defaults_to_no_config_file() {
        let cli = Cli::parse_from(["siprecd"]);
        assert_eq!(cli.config, None);
        assert!(!cli.verbose);
    }
}
