//! Application startup.
//!
//! Builds the backends from configuration, feeds stdin lines to the event
//! loop as commands and prints whatever it renders to stdout.

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::{App, Command, CommandError};
use crate::config::ConfigV1;
use crate::state::AppState;

/// Commands parsed ahead of the loop; input is line-paced so this never fills up.
const COMMAND_QUEUE: usize = 32;

/// Runs the bookmark manager until `quit` or end of input.
pub async fn run(config: Arc<ConfigV1>) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(config);
    info!(
        "Starting with auth '{}', store '{}' and feed '{}'",
        state.auth.get_name(),
        state.store.get_name(),
        state.feed.get_name()
    );

    let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
    // Blocking stdin reads stay off the runtime.
    std::thread::spawn(move || read_commands(tx));

    let mut app = App::new(&state);
    app.run(rx, |screen| println!("{}\n", screen)).await;

    info!("Stopped");
    Ok(())
}

/// Parses stdin line by line. Unparsable lines are reported and skipped.
fn read_commands(tx: mpsc::Sender<Command>) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Reading input failed: {}", e);
                return;
            }
        };
        match line.parse::<Command>() {
            Ok(command) => {
                if tx.blocking_send(command).is_err() {
                    return;
                }
            }
            Err(CommandError::Empty) => {}
            Err(e) => eprintln!("{}", e),
        }
    }
    debug!("End of input");
}
