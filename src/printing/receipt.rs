//! Receipt printing on a networked thermal printer.
//!
//! The printer listens on a raw TCP port (usually 9100) and takes Star
//! line-mode commands. Only the handful needed for a ticket receipt are
//! used: emphasis on/off, line feeds and a partial cut.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::{ReceiptJob, ReceiptPrinter};
use crate::error::AutoprintError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(20);

const EMPHASIS_ON: &[u8] = &[0x1b, 0x45];
const EMPHASIS_OFF: &[u8] = &[0x1b, 0x46];
const FEED_AND_CUT: &[u8] = &[0x1b, 0x64, 0x02];

/// Receipt printer reachable over raw TCP.
pub struct TcpReceiptPrinter {
    addr: String,
    /// One job at a time on the device.
    device: Mutex<()>,
}

impl TcpReceiptPrinter {
    /// Creates a printer for `host:port`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            device: Mutex::new(()),
        }
    }

    /// Encodes a receipt as the byte stream sent to the printer.
    pub fn encode(job: &ReceiptJob) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"\n\n\n");
        out.extend_from_slice(EMPHASIS_ON);
        out.extend_from_slice(job.ticket_id.as_str().as_bytes());
        out.extend_from_slice(b"\n\n");
        out.extend_from_slice(job.subject.as_bytes());
        out.extend_from_slice(EMPHASIS_OFF);
        out.extend_from_slice(b"\n\n\n");
        out.extend_from_slice(job.detail.as_bytes());
        out.extend_from_slice(b"\n\n\n");
        out.extend_from_slice(job.date.as_bytes());
        out.extend_from_slice(b"\n\n\n");
        out.extend_from_slice(FEED_AND_CUT);
        out
    }

    async fn send(&self, payload: &[u8]) -> Result<(), AutoprintError> {
        let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| AutoprintError::print("receipt", format!("connect to {} timed out", self.addr)))?
            .map_err(|e| AutoprintError::print("receipt", format!("connect to {}: {}", self.addr, e)))?;

        tokio::time::timeout(WRITE_TIMEOUT, async {
            stream.write_all(payload).await?;
            stream.flush().await?;
            stream.shutdown().await
        })
        .await
        .map_err(|_| AutoprintError::print("receipt", "write timed out"))?
        .map_err(|e| AutoprintError::print("receipt", e.to_string()))
    }
}

#[async_trait]
impl ReceiptPrinter for TcpReceiptPrinter {
    async fn print_receipt(&self, job: &ReceiptJob) -> Result<(), AutoprintError> {
        let payload = Self::encode(job);

        let _device = self.device.lock().await;
        self.send(&payload).await?;

        tracing::info!(ticket_id = %job.ticket_id, "Receipt printed");
        Ok(())
    }
}
