// broker.rs - Turn orchestrator: owns the grid, fans bands out to workers, hands turns to the client

use std::sync::Arc;

use conway::{Band, BandResult, Grid, band_bounds, merge, partition};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::BrokerError;
use crate::rendezvous::{self, Publisher, Taker};
use crate::worker::{Worker, WorkerError};

const REQUEST_CAPACITY: usize = 16;

/// One completed turn as handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSnapshot {
    pub grid: Arc<Grid>,
    pub alive: usize,
    pub turn: u32,
}

/// Where the broker is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Running,
    /// Turn budget reached.
    Completed { turn: u32 },
    /// Stopped at a quit request after handing over `turn`.
    Quit { turn: u32 },
    /// Turn loop died; no further turns will be published.
    Failed(BrokerError),
    Stopped,
}

enum Request {
    Start {
        grid: Grid,
        turns: u32,
        bands: usize,
        reply: oneshot::Sender<Result<(), BrokerError>>,
    },
    Taker {
        reply: oneshot::Sender<Result<Taker<TurnSnapshot>, BrokerError>>,
    },
    Quit {
        reply: oneshot::Sender<Result<(), BrokerError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<(), BrokerError>>,
    },
    Status {
        reply: oneshot::Sender<Status>,
    },
}

/// Cloneable handle used by clients to drive the broker task.
#[derive(Clone)]
pub struct BrokerHandle {
    requests: mpsc::Sender<Request>,
}

impl BrokerHandle {
    /// Spawns the broker task on the current runtime. It stays idle until [`start`](Self::start).
    pub fn spawn(workers: Vec<Arc<dyn Worker>>) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_CAPACITY);
        tokio::spawn(Broker::new(workers).run(rx));
        Self { requests: tx }
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(request(tx))
            .await
            .map_err(|_| BrokerError::BrokerGone)?;
        rx.await.map_err(|_| BrokerError::BrokerGone)
    }

    /// Begins computing `turns` turns of `grid`, split into `bands` bands.
    pub async fn start(&self, grid: Grid, turns: u32, bands: usize) -> Result<(), BrokerError> {
        self.call(|reply| Request::Start {
            grid,
            turns,
            bands,
            reply,
        })
        .await?
    }

    /// Waits for the next turn the broker publishes.
    ///
    /// After a worker failure this never resolves; wrap it in a timeout if that matters.
    pub async fn get_latest_turn(&self) -> Result<TurnSnapshot, BrokerError> {
        let taker = self.call(|reply| Request::Taker { reply }).await??;
        taker.take().await.map_err(|_| BrokerError::AlreadyStopped)
    }

    /// Asks the turn loop to stop once the turn in flight has been handed over.
    pub async fn request_quit(&self) -> Result<(), BrokerError> {
        self.call(|reply| Request::Quit { reply }).await?
    }

    /// Stops the workers and the broker at once, without waiting for the turn in flight.
    pub async fn request_stop(&self) -> Result<(), BrokerError> {
        self.call(|reply| Request::Stop { reply }).await?
    }

    pub async fn status(&self) -> Result<Status, BrokerError> {
        self.call(|reply| Request::Status { reply }).await
    }
}

enum Phase {
    Idle,
    Running {
        taker: Taker<TurnSnapshot>,
        quit: Option<oneshot::Sender<()>>,
        run: JoinHandle<RunExit>,
    },
    /// The publisher is kept so that waiting takers stay blocked instead of erroring.
    Failed {
        taker: Taker<TurnSnapshot>,
        _publisher: Publisher<TurnSnapshot>,
        error: BrokerError,
    },
    Finished(Status),
    Stopped,
}

enum Event {
    Request(Option<Request>),
    Exited(Result<RunExit, tokio::task::JoinError>),
}

/// The single task that owns broker state. Every control call arrives as a [`Request`].
struct Broker {
    workers: Arc<[Arc<dyn Worker>]>,
    phase: Phase,
}

impl Broker {
    fn new(workers: Vec<Arc<dyn Worker>>) -> Self {
        Self {
            workers: workers.into(),
            phase: Phase::Idle,
        }
    }

    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        loop {
            let event = match &mut self.phase {
                Phase::Running { run, .. } => tokio::select! {
                    exit = run => Event::Exited(exit),
                    request = requests.recv() => Event::Request(request),
                },
                _ => Event::Request(requests.recv().await),
            };

            match event {
                Event::Exited(exit) => self.finish(exit),
                Event::Request(Some(request)) => self.handle(request).await,
                Event::Request(None) => break,
            }
        }

        if let Phase::Running { run, .. } = &self.phase {
            run.abort();
        }
        debug!("all broker handles dropped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Start {
                grid,
                turns,
                bands,
                reply,
            } => {
                let _ = reply.send(self.start(grid, turns, bands));
            }
            Request::Taker { reply } => {
                let taker = match &self.phase {
                    Phase::Idle => Err(BrokerError::NotRunning),
                    Phase::Running { taker, .. } | Phase::Failed { taker, .. } => Ok(taker.clone()),
                    Phase::Finished(_) | Phase::Stopped => Err(BrokerError::AlreadyStopped),
                };
                let _ = reply.send(taker);
            }
            Request::Quit { reply } => {
                let result = match &mut self.phase {
                    Phase::Idle => Err(BrokerError::NotRunning),
                    Phase::Stopped => Err(BrokerError::AlreadyStopped),
                    Phase::Running { quit, .. } => {
                        if let Some(quit) = quit.take() {
                            info!("quit requested");
                            let _ = quit.send(());
                        }
                        Ok(())
                    }
                    Phase::Failed { .. } | Phase::Finished(_) => Ok(()),
                };
                let _ = reply.send(result);
            }
            Request::Stop { reply } => {
                let result = match std::mem::replace(&mut self.phase, Phase::Stopped) {
                    Phase::Idle => {
                        self.phase = Phase::Idle;
                        Err(BrokerError::NotRunning)
                    }
                    Phase::Stopped => Err(BrokerError::AlreadyStopped),
                    Phase::Running { run, .. } => {
                        warn!("stop requested with a turn loop still running, aborting it");
                        run.abort();
                        Ok(())
                    }
                    Phase::Failed { .. } | Phase::Finished(_) => Ok(()),
                };
                if result.is_ok() {
                    self.stop_workers().await;
                    info!("broker stopped");
                }
                let _ = reply.send(result);
            }
            Request::Status { reply } => {
                let status = match &self.phase {
                    Phase::Idle => Status::Idle,
                    Phase::Running { .. } => Status::Running,
                    Phase::Failed { error, .. } => Status::Failed(error.clone()),
                    Phase::Finished(status) => status.clone(),
                    Phase::Stopped => Status::Stopped,
                };
                let _ = reply.send(status);
            }
        }
    }

    fn start(&mut self, grid: Grid, turns: u32, bands: usize) -> Result<(), BrokerError> {
        match self.phase {
            Phase::Running { .. } => return Err(BrokerError::AlreadyRunning),
            Phase::Stopped => return Err(BrokerError::AlreadyStopped),
            Phase::Idle | Phase::Failed { .. } | Phase::Finished(_) => {}
        }
        if self.workers.is_empty() {
            return Err(BrokerError::NoWorkers);
        }
        band_bounds(grid.height(), bands)?;

        info!(
            width = grid.width(),
            height = grid.height(),
            turns,
            bands,
            workers = self.workers.len(),
            "starting turn loop"
        );
        let (publisher, taker) = rendezvous::channel();
        let (quit_tx, quit_rx) = oneshot::channel();
        let turn_loop = TurnLoop {
            grid: Arc::new(grid),
            turn: 0,
            turns,
            bands,
            workers: Arc::clone(&self.workers),
        };
        self.phase = Phase::Running {
            taker,
            quit: Some(quit_tx),
            run: tokio::spawn(turn_loop.run(publisher, quit_rx)),
        };
        Ok(())
    }

    fn finish(&mut self, exit: Result<RunExit, tokio::task::JoinError>) {
        let Phase::Running { taker, .. } = std::mem::replace(&mut self.phase, Phase::Stopped) else {
            return;
        };
        self.phase = match exit {
            Ok(RunExit {
                outcome: Ok(status),
                ..
            }) => {
                info!(?status, "turn loop finished");
                Phase::Finished(status)
            }
            Ok(RunExit {
                outcome: Err(error),
                publisher,
            }) => {
                error!(%error, "turn loop failed");
                Phase::Failed {
                    taker,
                    _publisher: publisher,
                    error,
                }
            }
            Err(join) => {
                error!(%join, "turn loop panicked");
                Phase::Finished(Status::Failed(BrokerError::Aborted(join.to_string())))
            }
        };
    }

    async fn stop_workers(&self) {
        for worker in self.workers.iter() {
            if let Err(e) = worker.stop().await {
                warn!(worker = worker.name(), error = %e, "worker did not stop cleanly");
            }
        }
    }
}

struct RunExit {
    outcome: Result<Status, BrokerError>,
    publisher: Publisher<TurnSnapshot>,
}

/// State carried from turn to turn by the running loop.
struct TurnLoop {
    grid: Arc<Grid>,
    turn: u32,
    turns: u32,
    bands: usize,
    workers: Arc<[Arc<dyn Worker>]>,
}

impl TurnLoop {
    async fn run(
        mut self,
        mut publisher: Publisher<TurnSnapshot>,
        mut quit: oneshot::Receiver<()>,
    ) -> RunExit {
        let outcome = self.drive(&mut publisher, &mut quit).await;
        RunExit { outcome, publisher }
    }

    async fn drive(
        &mut self,
        publisher: &mut Publisher<TurnSnapshot>,
        quit: &mut oneshot::Receiver<()>,
    ) -> Result<Status, BrokerError> {
        while self.turn < self.turns {
            let bands = partition(&self.grid, self.bands)?;
            let results = dispatch(&self.workers, bands, self.turn).await?;
            let merged = merge(&results, self.grid.height())?;

            self.grid = Arc::new(merged.grid);
            self.turn = merged.turn;
            let snapshot = TurnSnapshot {
                grid: Arc::clone(&self.grid),
                alive: merged.alive,
                turn: self.turn,
            };
            debug!(turn = self.turn, alive = merged.alive, "turn ready");

            if publisher.publish(snapshot).await.is_err() {
                // every taker is gone, which only happens once the broker task itself is gone
                return Ok(Status::Stopped);
            }
            if quit.try_recv().is_ok() {
                return Ok(Status::Quit { turn: self.turn });
            }
        }
        Ok(Status::Completed { turn: self.turn })
    }
}

/// Sends band `i` to worker `i % workers.len()` and waits for every result.
///
/// The first failing band fails the turn; bands still in flight are aborted.
async fn dispatch(
    workers: &[Arc<dyn Worker>],
    bands: Vec<Band>,
    turn: u32,
) -> Result<Vec<BandResult>, BrokerError> {
    let mut pending: Vec<_> = bands
        .into_iter()
        .enumerate()
        .map(|(i, band)| {
            let worker = Arc::clone(&workers[i % workers.len()]);
            let shape = (band.top, band.height(), band.width());
            let handle = tokio::spawn(async move { worker.update(band, turn).await });
            (shape, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(pending.len());
    for band in 0..pending.len() {
        let (shape, handle) = &mut pending[band];
        let worker = workers[band % workers.len()].name();
        match checked(handle.await, *shape, turn, worker, band) {
            Ok(result) => results.push(result),
            Err(e) => {
                for (_, handle) in &pending[band + 1..] {
                    handle.abort();
                }
                return Err(e);
            }
        }
    }
    Ok(results)
}

/// Maps a band task's outcome to a result of the expected shape, or the error that fails the turn.
fn checked(
    joined: Result<Result<BandResult, WorkerError>, tokio::task::JoinError>,
    (top, height, width): (usize, usize, usize),
    turn: u32,
    worker: &str,
    band: usize,
) -> Result<BandResult, BrokerError> {
    let worker = worker.to_owned();
    let result = match joined {
        Ok(Ok(result)) => result,
        Ok(Err(WorkerError::Unreachable(reason))) => {
            return Err(BrokerError::WorkerUnreachable {
                worker,
                band,
                reason,
            });
        }
        Ok(Err(WorkerError::Failure(reason))) => {
            return Err(BrokerError::WorkerFailure {
                worker,
                band,
                reason,
            });
        }
        Err(join) => {
            return Err(BrokerError::WorkerFailure {
                worker,
                band,
                reason: join.to_string(),
            });
        }
    };

    let well_formed = result.top == top
        && result.cells.height() == height
        && result.cells.width() == width
        && result.turn == turn + 1;
    if !well_formed {
        return Err(BrokerError::WorkerFailure {
            worker,
            band,
            reason: format!(
                "malformed result: rows {}..{} of width {} for turn {}",
                result.top,
                result.top + result.cells.height(),
                result.cells.width(),
                result.turn
            ),
        });
    }
    Ok(result)
}
