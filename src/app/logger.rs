//! Structured logging setup.

use tracing_subscriber::EnvFilter;

use super::args::{Args, LogFormat};
use crate::config::{Config, VERSION};

pub fn init_logging(args: &Args, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::from_default_env().add_directive(args.log_level.into()));

    let json = config.general.log_json || matches!(args.log_format, LogFormat::Structured);
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(!args.no_color);

    match (json, &args.log_format) {
        (true, _) => subscriber.json().init(),
        (false, LogFormat::Debug) => subscriber.pretty().init(),
        (false, _) => subscriber.init(),
    }

    tracing::info!(version = VERSION, "starting shardrouterd");
    Ok(())
}
