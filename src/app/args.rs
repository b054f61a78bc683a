//! Command-line arguments.

use clap::{Parser, ValueEnum};
use tracing::Level;

/// shardrouterd: partition-aware statement router for a clustered SQL database.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(default_value_t = String::from("shardrouter.toml"), env)]
    pub config_file: String,

    #[arg(short, long, default_value_t = tracing::Level::INFO, env)]
    pub log_level: Level,

    #[clap(short = 'F', long, value_enum, default_value_t = LogFormat::Text, env)]
    pub log_format: LogFormat,

    #[arg(short, long, default_value_t = false, env, help = "disable colors in the log output")]
    pub no_color: bool,

    #[arg(short = 't', long = "test-config", default_value_t = false, help = "validate the configuration file and exit")]
    pub test_config: bool,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum LogFormat {
    Text,
    Structured,
    Debug,
}

pub fn parse() -> Args {
    Args::parse()
}
