//! Local channel: newline-delimited JSON-RPC over stdin/stdout
//!
//! Strictly sequential: a frame is read, handled to completion and its
//! response flushed before the next frame is read. Stdout carries protocol
//! frames only; logs go to stderr.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use super::TransportError;
use crate::rpc::service::GatewayService;

pub struct StdioTransport {
    service: Arc<GatewayService>,
}

impl StdioTransport {
    pub fn new(service: Arc<GatewayService>) -> Self {
        Self { service }
    }

    /// Serve the process's stdin/stdout until stdin closes.
    pub async fn run(&self) -> Result<(), TransportError> {
        info!("Serving JSON-RPC on stdio");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<(), TransportError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let frame = line.trim();
            if frame.is_empty() {
                continue;
            }
            let Some(response) = self.service.handle_text(frame).await else {
                debug!("Notification handled, no response");
                continue;
            };
            let mut encoded = serde_json::to_vec(&response)?;
            encoded.push(b'\n');
            writer.write_all(&encoded).await?;
            writer.flush().await?;
        }
        info!("stdin closed, stopping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::service;
    use serde_json::Value;

    async fn exchange(input: &str) -> Vec<Value> {
        let transport = StdioTransport::new(service().into_shared());
        let mut output = Vec::new();
        transport
            .serve(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_responses_in_request_order() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"add","arguments":{"a":1,"b":2}}}"#,
            "\n",
            "garbage\n",
        );
        let responses = exchange(input).await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"]["data"], 3.0);
        assert_eq!(responses[2]["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_empty_input_ends_cleanly() {
        assert!(exchange("").await.is_empty());
    }
}
