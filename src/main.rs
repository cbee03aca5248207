//! Layerwise - protocol-detecting intercepting proxy

use std::path::PathBuf;

use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use layerwise::config::Config;
use layerwise::error::Result;
use layerwise::server::Runtime;

fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        println!("layerwise {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.gen_config {
        let json = serde_json::to_string_pretty(&Config::example())
            .map_err(|e| layerwise::Error::Config(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::example(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    if args.config.is_none() {
        info!("No config file specified, using the example config");
    }
    info!("Layerwise v{} starting...", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let runtime = Runtime::from_config(&config)?;
        runtime.run().await
    })?;

    info!("Goodbye!");
    Ok(())
}

struct Args {
    config: Option<PathBuf>,
    gen_config: bool,
    version: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut config = None;
        let mut gen_config = false;
        let mut version = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-c" | "--config" => {
                    if i + 1 < args.len() {
                        config = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--gen-config" => gen_config = true,
                "-v" | "--version" => version = true,
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                arg if !arg.starts_with('-') && config.is_none() => {
                    config = Some(PathBuf::from(arg));
                }
                _ => {}
            }
            i += 1;
        }

        Self { config, gen_config, version }
    }
}

fn print_help() {
    println!(
        r#"Layerwise - protocol-detecting intercepting proxy

USAGE:
    layerwise [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to configuration file
    --gen-config            Print an example configuration
    -v, --version           Print version information
    -h, --help              Print help information

ENVIRONMENT:
    RUST_LOG                Log level, overrides log.level from the config

EXAMPLES:
    layerwise -c config.json
    layerwise --gen-config > config.json
"#
    );
}
