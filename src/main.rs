use search_engine::cli::{self, CliArgs};
use search_engine::config::Config;
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();

    let mut args = CliArgs::parse(std::env::args().skip(1));

    match Config::from_default_locations() {
        Ok(Some((config, path))) => {
            tracing::debug!(path = %path.display(), "loaded configuration file");
            config.apply_to(&mut args);
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {e}");
        }
    }

    if let Err(e) = cli::run(&args) {
        eprintln!("Error: {e}");
    }
}
