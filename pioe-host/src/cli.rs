//! Command-line arguments.

use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about = "Run scripts on dynamically loaded pioe engines", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/pioe/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error. RUST_LOG takes precedence.
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Engine key or library path to load; may be repeated
    #[arg(short, long = "engine", value_name = "KEY")]
    pub engines: Vec<String>,

    /// Print the engine libraries found on the search path and exit
    #[arg(long)]
    pub list_engines: bool,

    /// Scripts to load after the engines are initialized
    pub scripts: Vec<PathBuf>,
}

impl Cli {
    /// Fold command-line overrides into `config`.
    ///
    /// Engines and scripts given on the command line are appended to the
    /// configured ones.
    pub fn apply(&self, config: &mut Config) {
        if let Some(level) = &self.log_level {
            config.host.log_level = level.clone();
        }
        config.engines.load.extend(self.engines.iter().cloned());
        config.scripts.load.extend(self.scripts.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::parse_from([
            "pioe-host",
            "--config",
            "host.toml",
            "-e",
            "ruby",
            "--engine",
            "./libpioeluaengine.so",
            "main.rb",
            "extra.lua",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("host.toml")));
        assert_eq!(cli.engines, vec!["ruby", "./libpioeluaengine.so"]);
        assert_eq!(
            cli.scripts,
            vec![PathBuf::from("main.rb"), PathBuf::from("extra.lua")]
        );
        assert!(!cli.list_engines);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_apply_appends_to_config() {
        let mut config = Config::default();
        config.engines.load.push("python".to_string());
        config.scripts.load.push(PathBuf::from("boot.py"));

        let cli = Cli::parse_from(["pioe-host", "-l", "debug", "-e", "ruby", "main.rb"]);
        cli.apply(&mut config);

        assert_eq!(config.host.log_level, "debug");
        assert_eq!(config.engines.load, vec!["python", "ruby"]);
        assert_eq!(
            config.scripts.load,
            vec![PathBuf::from("boot.py"), PathBuf::from("main.rb")]
        );
    }

    #[test]
    fn test_apply_keeps_configured_log_level() {
        let mut config = Config::default();
        config.host.log_level = "warn".to_string();

        Cli::parse_from(["pioe-host"]).apply(&mut config);
        assert_eq!(config.host.log_level, "warn");
    }
}
