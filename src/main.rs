use std::process;

use shardrouter::app::{self, Args};
use shardrouter::config;

fn main() {
    let args: Args = app::parse();

    if let Err(err) = run(args) {
        eprintln!("{err}");
        process::exit(exitcode::CONFIG);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(config::parse(&args.config_file))?;
    let config = (*config::get_config()).clone();
    drop(runtime);

    if args.test_config {
        println!("configuration file '{}' is valid", args.config_file);
        return Ok(());
    }

    app::init_logging(&args, &config)?;
    app::server::run(args, config)
}
