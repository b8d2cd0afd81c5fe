// client.rs - Broker-side handle on a remote worker process

use conway::{Band, BandResult};
use conway_broker::{StopFut, UpdateFut, Worker, WorkerError};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::TransportError;
use crate::protocol::{WorkerRequest, WorkerResponse, read_message, write_message};

struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn open(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read).lines(),
            writer,
        })
    }

    async fn roundtrip(&mut self, request: &WorkerRequest) -> Result<WorkerResponse, TransportError> {
        write_message(&mut self.writer, request).await?;
        read_message(&mut self.lines)
            .await?
            .ok_or(TransportError::Closed)
    }
}

/// Worker reached over TCP. Requests to the same worker are sent one at a time.
pub struct RemoteWorker {
    addr: String,
    conn: Mutex<Option<Connection>>,
}

impl RemoteWorker {
    /// Connects lazily, on the first request.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: Mutex::new(None),
        }
    }

    async fn call(&self, request: WorkerRequest) -> Result<WorkerResponse, TransportError> {
        let mut slot = self.conn.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => {
                debug!(addr = %self.addr, "connecting to worker");
                Connection::open(&self.addr).await?
            }
        };
        let response = conn.roundtrip(&request).await?;
        // a failed roundtrip drops the connection so the next call reconnects
        *slot = Some(conn);
        Ok(response)
    }
}

impl Worker for RemoteWorker {
    fn name(&self) -> &str {
        &self.addr
    }

    fn update(&self, band: Band, turn: u32) -> UpdateFut<'_> {
        Box::pin(async move {
            match self.call(WorkerRequest::Update { band, turn }).await? {
                WorkerResponse::Updated(result) => Ok::<BandResult, WorkerError>(result),
                WorkerResponse::Error(reason) => Err(WorkerError::Failure(reason)),
                other => Err(WorkerError::Failure(format!("unexpected response {other:?}"))),
            }
        })
    }

    fn stop(&self) -> StopFut<'_> {
        Box::pin(async move {
            match self.call(WorkerRequest::Stop).await? {
                WorkerResponse::Stopped => {
                    self.conn.lock().await.take();
                    Ok::<(), WorkerError>(())
                }
                WorkerResponse::Error(reason) => Err(WorkerError::Failure(reason)),
                other => Err(WorkerError::Failure(format!("unexpected response {other:?}"))),
            }
        })
    }
}
