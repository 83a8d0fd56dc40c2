//! Operator step signals
//!
//! In `--step` mode every line read from the operator's input releases one
//! staged scripted send.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const STEP_BUFFER: usize = 16;

/// Spawn a task that turns each input line into one step signal
pub fn spawn_step_reader<R>(input: R) -> mpsc::Receiver<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(STEP_BUFFER);
    tokio::spawn(async move {
        let mut lines = BufReader::new(input).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(_)) => {
                    if sender.send(()).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Step input reached end of file");
                    break;
                }
                Err(e) => {
                    warn!("Cannot read step input: {}", e);
                    break;
                }
            }
        }
    });
    receiver
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_signal_per_line() {
        let mut signals = spawn_step_reader(&b"\nnext\n\n"[..]);
        for _ in 0..3 {
            assert_eq!(signals.recv().await, Some(()));
        }
        assert_eq!(signals.recv().await, None);
    }
}
