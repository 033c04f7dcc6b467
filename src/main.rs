use std::sync::Arc;

use smartmark::config::{load_config, schema_json};
use smartmark::startup;
use smartmark::utils::logger::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args().any(|arg| arg == "--schema") {
        println!("{}", schema_json());
        return Ok(());
    }

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    startup::run(Arc::new(config)).await
}
