// protocol.rs - Newline-delimited JSON messages between broker and worker

use conway::{Band, BandResult};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, Lines};

use crate::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerRequest {
    Update { band: Band, turn: u32 },
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerResponse {
    Updated(BandResult),
    Stopped,
    Error(String),
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(message)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Next message on the line stream, or `None` once the peer hung up.
pub async fn read_message<R, T>(lines: &mut Lines<R>) -> Result<Option<T>, TransportError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    match lines.next_line().await? {
        Some(line) => Ok(Some(serde_json::from_str(&line)?)),
        None => Ok(None),
    }
}
