//! Discovery Feed
//!
//! Boundary glue: reads newline-delimited JSON candidate descriptions and
//! feeds them to the orchestrator. Malformed lines are logged and skipped so
//! one bad record cannot stall the feed.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::candidate::CandidateConfig;

/// Pump candidate descriptions out of a reader until EOF or until the
/// receiver is dropped.
pub async fn pump_feed<R>(reader: R, tx: mpsc::Sender<CandidateConfig>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<CandidateConfig>(line) {
                    Ok(config) => {
                        if tx.send(config).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "skipping malformed discovery line"),
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "discovery feed read failed");
                break;
            }
        }
    }
    info!("discovery feed ended");
}

/// Feed candidates from stdin.
pub fn spawn_stdin_feed(buffer: usize) -> mpsc::Receiver<CandidateConfig> {
    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(pump_feed(tokio::io::stdin(), tx));
    rx
}
