// keys.rs - Keypresses from the terminal, decoded into client commands

use std::io::BufRead;

use conway_distributor::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// `s` snapshot, `q` quit, `p` pause/resume, `k` stop everything.
pub fn decode(key: char) -> Option<Command> {
    match key.to_ascii_lowercase() {
        's' => Some(Command::Snapshot),
        'q' => Some(Command::Quit),
        'p' => Some(Command::Pause),
        'k' => Some(Command::Stop),
        _ => None,
    }
}

/// Forwards every recognised key, one or more per line, until input ends or the client
/// loop goes away. Blocking; run it on its own thread.
pub fn forward_keys(input: impl BufRead, commands: mpsc::Sender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "reading keys failed");
                return;
            }
        };
        for key in line.chars().filter(|c| !c.is_whitespace()) {
            let Some(command) = decode(key) else {
                debug!(%key, "ignoring key");
                continue;
            };
            if commands.blocking_send(command).is_err() {
                return;
            }
        }
    }
}
