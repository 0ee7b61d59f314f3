//! Livestatus socket connector.
//!
//! One stream per request: the query block is written terminated by a blank
//! line, the reply is CSV rows (separator `;`) until a blank line or EOF.
//! Rows stream out over a channel while the reply is still being read; the
//! completion signal reports `true` on a clean end and `false` on any dial
//! or I/O error.

use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::LivestatusError;

/// Field separator of livestatus CSV replies.
pub const FIELD_SEPARATOR: char = ';';

const ROW_CHANNEL_CAPACITY: usize = 64;

/// How a livestatus endpoint is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// `host:port` over TCP.
    Tcp,
    /// Filesystem path of a local stream socket.
    Unix,
}

impl FromStr for ConnectionType {
    type Err = LivestatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(ConnectionType::Tcp),
            "file" | "unix" | "socket" => Ok(ConnectionType::Unix),
            other => Err(LivestatusError::UnknownConnectionType {
                value: other.to_string(),
            }),
        }
    }
}

/// Connector to one livestatus endpoint.
#[derive(Debug, Clone)]
pub struct Connector {
    address: String,
    connection_type: ConnectionType,
}

impl Connector {
    pub fn new(address: impl Into<String>, connection_type: ConnectionType) -> Self {
        Self {
            address: address.into(),
            connection_type,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Issue one query.
    ///
    /// Returns the lazy row sequence and the completion signal. The request
    /// runs on its own task; dropping the row receiver aborts the read.
    pub fn query(
        &self,
        request: impl Into<String>,
    ) -> (mpsc::Receiver<Vec<String>>, oneshot::Receiver<bool>) {
        let (row_tx, row_rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();
        let connector = self.clone();
        let request = request.into();

        tokio::spawn(async move {
            let outcome = connector.run_query(request, row_tx).await;
            if let Err(error) = &outcome {
                warn!(address = %connector.address, error = %error, "livestatus query failed");
            }
            let _ = done_tx.send(outcome.is_ok());
        });

        (row_rx, done_rx)
    }

    async fn run_query(
        &self,
        request: String,
        rows: mpsc::Sender<Vec<String>>,
    ) -> Result<(), LivestatusError> {
        match self.connection_type {
            ConnectionType::Tcp => {
                let stream = TcpStream::connect(&self.address)
                    .await
                    .map_err(|e| LivestatusError::dial(&self.address, e))?;
                Self::exchange(stream, request, rows).await
            }
            ConnectionType::Unix => {
                let stream = UnixStream::connect(&self.address)
                    .await
                    .map_err(|e| LivestatusError::dial(&self.address, e))?;
                Self::exchange(stream, request, rows).await
            }
        }
    }

    async fn exchange<S>(
        mut stream: S,
        mut request: String,
        rows: mpsc::Sender<Vec<String>>,
    ) -> Result<(), LivestatusError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // The request block is terminated by one blank line.
        if !request.ends_with('\n') {
            request.push('\n');
        }
        if !request.ends_with("\n\n") {
            request.push('\n');
        }
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let reader = BufReader::new(stream);
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.is_empty() {
                break;
            }
            let row: Vec<String> = line.split(FIELD_SEPARATOR).map(str::to_string).collect();
            if rows.send(row).await.is_err() {
                // Receiver gone, nobody cares about the rest of the reply.
                break;
            }
        }
        Ok(())
    }
}

/// Drain one query into memory, failing unless it completed cleanly.
pub async fn collect_rows(
    connector: &Connector,
    request: impl Into<String>,
) -> Result<Vec<Vec<String>>, LivestatusError> {
    let (mut rows, done) = connector.query(request);
    let mut collected = Vec::new();
    while let Some(row) = rows.recv().await {
        collected.push(row);
    }
    match done.await {
        Ok(true) => Ok(collected),
        _ => Err(LivestatusError::QueryFailed),
    }
}
