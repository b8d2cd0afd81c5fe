// server.rs - Worker process: answers band updates until told to stop

use std::net::SocketAddr;
use std::sync::Arc;

use conway::next_band;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::TransportError;
use crate::protocol::{WorkerRequest, WorkerResponse, read_message, write_message};

/// Accepts broker connections on `listener` until a `Stop` request arrives.
pub async fn serve(listener: TcpListener) -> Result<(), TransportError> {
    let shutdown = Arc::new(Notify::new());
    info!(addr = %listener.local_addr()?, "worker listening");

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("worker stopping");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                debug!(%peer, "broker connected");
                let shutdown = Arc::clone(&shutdown);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, &shutdown).await {
                        warn!(%peer, error = %e, "connection ended with an error");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: &Notify,
) -> Result<(), TransportError> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    loop {
        let request = match read_message::<_, WorkerRequest>(&mut lines).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(%peer, "broker disconnected");
                return Ok(());
            }
            Err(TransportError::Json(e)) => {
                warn!(%peer, error = %e, "malformed request");
                write_message(&mut write, &WorkerResponse::Error(format!("bad request: {e}"))).await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        match request {
            WorkerRequest::Update { band, turn } => {
                debug!(%peer, turn, top = band.top, rows = band.height(), "updating band");
                let response = match tokio::task::spawn_blocking(move || next_band(&band, turn)).await {
                    Ok(result) => WorkerResponse::Updated(result),
                    Err(e) => WorkerResponse::Error(e.to_string()),
                };
                write_message(&mut write, &response).await?;
            }
            WorkerRequest::Stop => {
                write_message(&mut write, &WorkerResponse::Stopped).await?;
                shutdown.notify_one();
                return Ok(());
            }
        }
    }
}
