//! Console source: reads commands from stdin.
//!
//! Every non-empty line becomes a `chat` event from a local sender, so the
//! whole bridge can be exercised from a terminal without the chat transport.

use async_trait::async_trait;
use lunabridge_core::channel::{Channel, InboundEvent};
use lunabridge_core::error::ChannelError;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Inbound source backed by the terminal.
pub struct ConsoleSource {
    sender: String,
}

impl ConsoleSource {
    /// `sender` is used as both the reply number and the raw sender id.
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

impl Default for ConsoleSource {
    fn default() -> Self {
        Self::new("local_user")
    }
}

/// Pump lines from `reader` into `tx` until EOF or an exit command.
async fn pump<R>(reader: R, sender: String, tx: mpsc::Sender<Result<InboundEvent, ChannelError>>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if matches!(line.as_str(), "exit" | "quit" | ":q") {
                    break;
                }

                let event = InboundEvent::chat(line, &sender, Uuid::new_v4().to_string(), &sender);
                if tx.send(Ok(event)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break, // EOF (Ctrl+D)
            Err(e) => {
                let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                break;
            }
        }
    }
}

#[async_trait]
impl Channel for ConsoleSource {
    fn name(&self) -> &str {
        "console"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<InboundEvent, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let sender = self.sender.clone();
        tokio::spawn(async move { pump(BufReader::new(io::stdin()), sender, tx).await });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_become_chat_events() {
        let input: &[u8] = b"/luna hola\n\n   \nsegunda linea\nquit\n/luna ignored\n";
        let (tx, mut rx) = mpsc::channel(8);
        pump(input, "me".into(), tx).await;

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.body, "/luna hola");
        assert_eq!(first.kind, "chat");
        assert_eq!(first.number, "me");
        assert_eq!(first.from, "me");

        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second.body, "segunda linea");
        assert_ne!(first.id, second.id);

        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn console_name() {
        assert_eq!(ConsoleSource::default().name(), "console");
    }
}
