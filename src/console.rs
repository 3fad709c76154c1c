//! Operator console.
//!
//! Reads directives line by line (the `!` prefix is optional here) and
//! writes the relay's replies back. Runs until the input closes.
//!
//! Input is read on a plain OS thread and handed over through a channel, so
//! an idle terminal never keeps the runtime from shutting down.

use std::io::BufRead;
use std::thread;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::command::PREFIX;
use crate::relay::Relay;
use crate::Result;

/// Lines buffered between the reader thread and the console.
const LINE_BUFFER: usize = 16;

/// Read lines from `input` on a dedicated thread.
///
/// The channel closes when the input reaches end of file or fails. The thread
/// stops once the receiver is dropped and another line arrives.
pub fn spawn_line_reader<R>(input: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    let spawned = thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Console input failed");
                        break;
                    }
                }
            }
            debug!("Console reader exited");
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start console reader");
    }
    rx
}

/// Read lines from the process's standard input.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    spawn_line_reader(std::io::BufReader::new(std::io::stdin()))
}

/// Serve the console until the line channel closes.
///
/// Returns the number of lines that got a reply.
pub async fn run<W>(relay: &Relay, mut lines: mpsc::Receiver<String>, mut output: W) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut answered = 0;

    while let Some(line) = lines.recv().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let directive = if line.starts_with(PREFIX) {
            line.to_string()
        } else {
            format!("{PREFIX}{line}")
        };

        match relay.handle_command(None, &directive).await {
            Some(reply) => {
                output.write_all(reply.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
                answered += 1;
            }
            None => {
                let hint = format!("Unknown command: {line} (try help)\n");
                output.write_all(hint.as_bytes()).await?;
                output.flush().await?;
            }
        }
    }

    debug!(answered, "Console input closed");
    Ok(answered)
}
