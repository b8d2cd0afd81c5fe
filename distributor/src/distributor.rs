// distributor.rs - Client loop: pulls turns from the broker and turns them into events

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use conway::{Coord, Grid, Params};
use conway_broker::{BrokerError, BrokerHandle, TurnSnapshot};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, info, warn};

use crate::event::{Command, Event, State};
use crate::io::{ImageIo, IoError};

#[derive(Debug, Error)]
pub enum DistributorError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Io(#[from] IoError),
}

/// How a run ended, with the last turn the client saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed { turn: u32 },
    Quit { turn: u32 },
    Stopped { turn: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Interval between alive-cell reports.
    pub ticker_period: Duration,
    /// How long a quit waits for the turn in flight.
    pub final_turn_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ticker_period: Duration::from_secs(2),
            final_turn_timeout: Duration::from_secs(10),
        }
    }
}

/// Cells to report for `next`.
///
/// With no previous grid every live cell is reported; otherwise only the cells that changed.
/// Against an all-dead previous grid both give the same set.
pub fn changed_cells(previous: Option<&Grid>, next: &Grid) -> Vec<Coord> {
    match previous {
        None => next.alive_cells(),
        Some(previous) => previous.flipped_cells(next),
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    turn: u32,
    alive: usize,
    paused: bool,
}

/// Last turn the client retrieved.
struct Session {
    world: Arc<Grid>,
    turn: u32,
    alive: usize,
    paused: bool,
}

impl Session {
    fn progress(&self) -> Progress {
        Progress {
            turn: self.turn,
            alive: self.alive,
            paused: self.paused,
        }
    }
}

enum Ending {
    Completed,
    Quit,
    Stopped,
}

pub struct Distributor<I> {
    params: Params,
    broker: BrokerHandle,
    io: I,
    events: mpsc::Sender<Event>,
    config: ClientConfig,
}

impl<I: ImageIo> Distributor<I> {
    pub fn new(params: Params, broker: BrokerHandle, io: I, events: mpsc::Sender<Event>) -> Self {
        Self {
            params,
            broker,
            io,
            events,
            config: ClientConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads the initial grid, starts the broker and follows it until the run ends.
    pub async fn run(self, mut commands: mpsc::Receiver<Command>) -> Result<Outcome, DistributorError> {
        let params = self.params;
        let initial = self
            .io
            .load(&params.input_name(), params.image_width, params.image_height)?;
        info!(
            image = %params.input_name(),
            turns = params.turns,
            threads = params.threads,
            alive = initial.alive_count(),
            "initial grid loaded"
        );

        self.emit(Event::CellsFlipped {
            completed_turns: 0,
            cells: changed_cells(None, &initial),
        })
        .await;
        self.broker
            .start(initial.clone(), params.turns, params.threads)
            .await?;

        let mut session = Session {
            alive: initial.alive_count(),
            world: Arc::new(initial),
            turn: 0,
            paused: false,
        };
        let (progress_tx, progress_rx) = watch::channel(session.progress());
        let ticker = tokio::spawn(report_alive(
            progress_rx,
            self.events.clone(),
            self.config.ticker_period,
        ));

        let ending = self.drive(&mut session, &mut commands, &progress_tx).await;
        ticker.abort();
        self.finish(ending?, &session).await
    }

    async fn drive(
        &self,
        session: &mut Session,
        commands: &mut mpsc::Receiver<Command>,
        progress: &watch::Sender<Progress>,
    ) -> Result<Ending, DistributorError> {
        // Once issued, a take may already hold the broker's next turn, so it is always driven
        // to completion. Pausing only withholds the next one.
        let mut next_turn = None;
        let mut commands_open = true;

        while session.turn < self.params.turns {
            if next_turn.is_none() && !session.paused {
                next_turn = Some(Box::pin(self.broker.get_latest_turn()));
            }
            tokio::select! {
                command = commands.recv(), if commands_open => match command {
                    None => commands_open = false,
                    Some(Command::Pause) => {
                        session.paused = !session.paused;
                        let new_state = if session.paused { State::Paused } else { State::Executing };
                        info!(turn = session.turn, ?new_state, "pause toggled");
                        progress.send_replace(session.progress());
                        self.emit(Event::StateChange {
                            completed_turns: session.turn,
                            new_state,
                        })
                        .await;
                    }
                    Some(Command::Snapshot) => self.flush(session).await?,
                    Some(Command::Quit) => {
                        self.final_turn(session, next_turn.take()).await;
                        return Ok(Ending::Quit);
                    }
                    Some(Command::Stop) => {
                        if let Err(e) = self.broker.request_stop().await {
                            warn!(error = %e, "stop request failed");
                        }
                        return Ok(Ending::Stopped);
                    }
                },
                snapshot = issued(&mut next_turn), if next_turn.is_some() => {
                    next_turn = None;
                    self.apply(session, snapshot?).await;
                    progress.send_replace(session.progress());
                }
                else => {
                    // paused, and nothing left that could resume us
                    warn!(turn = session.turn, "command source closed while paused, quitting");
                    self.final_turn(session, next_turn.take()).await;
                    return Ok(Ending::Quit);
                }
            }
        }
        Ok(Ending::Completed)
    }

    /// Requests a quit, then keeps taking turns until the turn loop has exited.
    ///
    /// The loop only looks for the quit right after a handoff, so every turn it still publishes
    /// must be taken, starting with the one `pending` may already hold.
    async fn final_turn<F>(&self, session: &mut Session, pending: Option<F>)
    where
        F: Future<Output = Result<TurnSnapshot, BrokerError>>,
    {
        if let Err(e) = self.broker.request_quit().await {
            warn!(error = %e, "quit request failed");
            return;
        }
        let drain = async {
            if let Some(pending) = pending {
                match pending.await {
                    Ok(snapshot) => self.apply(session, snapshot).await,
                    Err(e) => {
                        warn!(error = %e, "no final turn");
                        return;
                    }
                }
            }
            loop {
                match self.broker.get_latest_turn().await {
                    Ok(snapshot) => self.apply(session, snapshot).await,
                    Err(BrokerError::AlreadyStopped) => return,
                    Err(e) => {
                        warn!(error = %e, "no final turn");
                        return;
                    }
                }
            }
        };
        if timeout(self.config.final_turn_timeout, drain).await.is_err() {
            warn!(turn = session.turn, "gave up waiting for the final turn");
        }
    }

    async fn apply(&self, session: &mut Session, snapshot: TurnSnapshot) {
        let cells = changed_cells(Some(&session.world), &snapshot.grid);
        debug!(turn = snapshot.turn, flipped = cells.len(), alive = snapshot.alive, "turn received");
        self.emit(Event::CellsFlipped {
            completed_turns: snapshot.turn,
            cells,
        })
        .await;

        session.world = snapshot.grid;
        session.alive = snapshot.alive;
        session.turn = snapshot.turn;
        self.emit(Event::TurnComplete {
            completed_turns: session.turn,
        })
        .await;
    }

    /// Writes the last known grid through the image collaborator.
    async fn flush(&self, session: &Session) -> Result<(), DistributorError> {
        let filename = self.params.output_name(session.turn);
        self.io.save(&filename, &session.world)?;
        info!(%filename, turn = session.turn, "snapshot written");
        self.emit(Event::ImageOutputComplete {
            completed_turns: session.turn,
            filename,
        })
        .await;
        Ok(())
    }

    async fn finish(&self, ending: Ending, session: &Session) -> Result<Outcome, DistributorError> {
        let turn = session.turn;
        let outcome = match ending {
            Ending::Completed => {
                self.emit(Event::FinalTurnComplete {
                    completed_turns: turn,
                    alive: session.world.alive_cells(),
                })
                .await;
                Outcome::Completed { turn }
            }
            Ending::Quit => Outcome::Quit { turn },
            Ending::Stopped => Outcome::Stopped { turn },
        };
        self.flush(session).await?;
        self.emit(Event::StateChange {
            completed_turns: turn,
            new_state: State::Quitting,
        })
        .await;
        info!(?outcome, "run finished");
        Ok(outcome)
    }

    async fn emit(&self, event: Event) {
        if self.events.send(event).await.is_err() {
            debug!("event receiver dropped");
        }
    }
}

/// Resolves the take in `slot`; never resolves when there is none.
async fn issued<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot {
        Some(turn) => turn.await,
        None => std::future::pending().await,
    }
}

/// Emits the last known alive count every `period` unless paused.
async fn report_alive(progress: watch::Receiver<Progress>, events: mpsc::Sender<Event>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Progress { turn, alive, paused } = *progress.borrow();
        if paused {
            continue;
        }
        let report = Event::AliveCellsCount {
            completed_turns: turn,
            cells_count: alive,
        };
        if events.send(report).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryIo;
    use conway::{patterns, step};
    use conway::Band;
    use conway_broker::{LocalWorker, Status, StopFut, UpdateFut, Worker, local_pool};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::sleep;

    const LONG_RUN: u32 = 1_000_000;

    fn params(turns: u32, threads: usize) -> Params {
        Params {
            turns,
            threads,
            image_width: 8,
            image_height: 8,
        }
    }

    fn glider() -> Grid {
        patterns::find("glider")
            .unwrap()
            .to_grid(8, 8, Coord::new(0, 0))
    }

    struct Harness {
        broker: BrokerHandle,
        io: Arc<MemoryIo>,
        commands: mpsc::Sender<Command>,
        events: Arc<Mutex<Vec<Event>>>,
        run: tokio::task::JoinHandle<Result<Outcome, DistributorError>>,
    }

    impl Harness {
        fn launch(params: Params, config: ClientConfig) -> Self {
            Self::launch_with(local_pool(2), params, config)
        }

        fn launch_with(workers: Vec<Arc<dyn Worker>>, params: Params, config: ClientConfig) -> Self {
            let broker = BrokerHandle::spawn(workers);
            let io = Arc::new(MemoryIo::new());
            io.insert("8x8", glider());

            let (events_tx, mut events_rx) = mpsc::channel(64);
            let events = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&events);
            tokio::spawn(async move {
                while let Some(event) = events_rx.recv().await {
                    log.lock().unwrap().push(event);
                }
            });

            let (commands, commands_rx) = mpsc::channel(8);
            let distributor = Distributor::new(params, broker.clone(), Arc::clone(&io), events_tx)
                .with_config(config);
            let run = tokio::spawn(distributor.run(commands_rx));
            Self {
                broker,
                io,
                commands,
                events,
                run,
            }
        }
    }

    /// Events collected since the last call.
    async fn drain(events: &Mutex<Vec<Event>>) -> Vec<Event> {
        // let the collector catch up
        sleep(Duration::from_millis(10)).await;
        std::mem::take(&mut *events.lock().unwrap())
    }

    async fn settled_status(broker: &BrokerHandle) -> Status {
        loop {
            match broker.status().await.unwrap() {
                Status::Running => sleep(Duration::from_millis(1)).await,
                status => return status,
            }
        }
    }

    fn quiet() -> ClientConfig {
        ClientConfig {
            ticker_period: Duration::from_secs(3600),
            ..ClientConfig::default()
        }
    }

    fn completed_turns(events: &[Event]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::TurnComplete { completed_turns } => Some(*completed_turns),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_full_scan_and_diff_agree() {
        let grid = patterns::random_grid(9, 7, 5);
        assert_eq!(
            changed_cells(None, &grid),
            changed_cells(Some(&Grid::new(9, 7)), &grid)
        );
    }

    #[tokio::test]
    async fn test_completed_run_reports_every_turn() {
        let h = Harness::launch(params(4, 2), quiet());
        let outcome = h.run.await.unwrap().unwrap();
        assert_eq!(outcome, Outcome::Completed { turn: 4 });

        let events = drain(&h.events).await;
        assert_eq!(completed_turns(&events), vec![1, 2, 3, 4]);

        // replaying the flipped cells over an empty grid lands on the final grid
        let mut world = Grid::new(8, 8);
        for event in &events {
            if let Event::CellsFlipped { cells, .. } = event {
                for c in cells {
                    world.set(c.x, c.y, !world.get(c.x, c.y));
                }
            }
        }
        let expected = patterns::find("glider")
            .unwrap()
            .to_grid(8, 8, Coord::new(1, 1));
        assert_eq!(world, expected);

        assert_eq!(h.io.get("8x8x4"), Some(expected.clone()));
        assert!(events.contains(&Event::FinalTurnComplete {
            completed_turns: 4,
            alive: expected.alive_cells(),
        }));
        assert_eq!(
            events.last(),
            Some(&Event::StateChange {
                completed_turns: 4,
                new_state: State::Quitting
            })
        );
    }

    #[tokio::test]
    async fn test_pause_withholds_turns() {
        let h = Harness::launch(params(LONG_RUN, 2), quiet());
        sleep(Duration::from_millis(20)).await;
        h.commands.send(Command::Pause).await.unwrap();

        let before = drain(&h.events).await;
        let paused_at = before
            .iter()
            .find_map(|e| match e {
                Event::StateChange {
                    completed_turns,
                    new_state: State::Paused,
                } => Some(*completed_turns),
                _ => None,
            })
            .unwrap();
        // a take issued before the pause still lands
        let shown = completed_turns(&before).last().copied().unwrap_or(0).max(paused_at);
        assert!(shown <= paused_at + 1);

        sleep(Duration::from_millis(100)).await;
        assert!(completed_turns(&drain(&h.events).await).is_empty());
        assert_eq!(h.broker.status().await.unwrap(), Status::Running);

        h.commands.send(Command::Pause).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        let resumed = drain(&h.events).await;
        assert_eq!(
            resumed.first(),
            Some(&Event::StateChange {
                completed_turns: shown,
                new_state: State::Executing
            })
        );
        let turns = completed_turns(&resumed);
        assert_eq!(turns.first(), Some(&(shown + 1)));

        h.commands.send(Command::Quit).await.unwrap();
        let outcome = h.run.await.unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Quit { turn } if turn > shown));
    }

    /// Local worker that counts the turns it has been asked to compute.
    struct CountingWorker {
        inner: LocalWorker,
        computed: Arc<AtomicU32>,
    }

    impl Worker for CountingWorker {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn update(&self, band: Band, turn: u32) -> UpdateFut<'_> {
            self.computed.fetch_max(turn + 1, Ordering::SeqCst);
            self.inner.update(band, turn)
        }

        fn stop(&self) -> StopFut<'_> {
            self.inner.stop()
        }
    }

    #[tokio::test]
    async fn test_quit_while_paused_settles_the_broker() {
        for _ in 0..10 {
            let computed = Arc::new(AtomicU32::new(0));
            let worker = CountingWorker {
                inner: LocalWorker::new("counting"),
                computed: Arc::clone(&computed),
            };
            let h = Harness::launch_with(
                vec![Arc::new(worker) as Arc<dyn Worker>],
                params(LONG_RUN, 1),
                quiet(),
            );
            sleep(Duration::from_millis(5)).await;
            h.commands.send(Command::Pause).await.unwrap();
            sleep(Duration::from_millis(50)).await;

            let shown = completed_turns(&drain(&h.events).await).last().copied().unwrap_or(0);
            let ahead = computed.load(Ordering::SeqCst);
            assert!(ahead <= shown + 1, "broker computed turn {ahead} while the client shows {shown}");

            h.commands.send(Command::Quit).await.unwrap();
            let Outcome::Quit { turn } = h.run.await.unwrap().unwrap() else {
                panic!("expected a quit");
            };
            // the turn parked at the handoff is the last one
            assert_eq!(turn, shown + 1);
            let status = timeout(Duration::from_secs(5), settled_status(&h.broker))
                .await
                .expect("broker still running after quit");
            assert_eq!(status, Status::Quit { turn });
            assert!(h.io.get(&format!("8x8x{turn}")).is_some());
        }
    }

    #[tokio::test]
    async fn test_quit_flushes_the_final_turn() {
        let h = Harness::launch(params(LONG_RUN, 2), quiet());
        sleep(Duration::from_millis(20)).await;
        h.commands.send(Command::Quit).await.unwrap();

        let Outcome::Quit { turn } = h.run.await.unwrap().unwrap() else {
            panic!("expected a quit");
        };
        assert_eq!(settled_status(&h.broker).await, Status::Quit { turn });

        let mut expected = glider();
        for _ in 0..turn {
            expected = step(&expected);
        }
        let name = format!("8x8x{turn}");
        assert_eq!(h.io.get(&name), Some(expected));
        assert!(drain(&h.events).await.contains(&Event::ImageOutputComplete {
            completed_turns: turn,
            filename: name,
        }));
    }

    #[tokio::test]
    async fn test_stop_halts_without_waiting() {
        let h = Harness::launch(params(LONG_RUN, 2), quiet());
        sleep(Duration::from_millis(20)).await;
        h.commands.send(Command::Pause).await.unwrap();
        h.commands.send(Command::Stop).await.unwrap();

        let Outcome::Stopped { turn } = h.run.await.unwrap().unwrap() else {
            panic!("expected a stop");
        };
        assert_eq!(h.broker.status().await.unwrap(), Status::Stopped);
        assert!(h.io.get(&format!("8x8x{turn}")).is_some());
        assert!(matches!(
            drain(&h.events).await.last(),
            Some(Event::StateChange {
                new_state: State::Quitting,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_snapshot_leaves_the_run_going() {
        let h = Harness::launch(params(LONG_RUN, 2), quiet());
        h.commands.send(Command::Pause).await.unwrap();
        h.commands.send(Command::Snapshot).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(h.broker.status().await.unwrap(), Status::Running);

        h.commands.send(Command::Quit).await.unwrap();
        h.run.await.unwrap().unwrap();

        let written: Vec<String> = drain(&h.events)
            .await
            .into_iter()
            .filter_map(|e| match e {
                Event::ImageOutputComplete { filename, .. } => Some(filename),
                _ => None,
            })
            .collect();
        // the manual snapshot, then the flush on quit
        assert_eq!(written.len(), 2);
        for name in &written {
            assert!(h.io.get(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_ticker_reports_alive_cells() {
        let h = Harness::launch(
            params(LONG_RUN, 1),
            ClientConfig {
                ticker_period: Duration::from_millis(20),
                ..ClientConfig::default()
            },
        );
        sleep(Duration::from_millis(100)).await;
        h.commands.send(Command::Quit).await.unwrap();
        h.run.await.unwrap().unwrap();

        let reports: Vec<usize> = drain(&h.events)
            .await
            .into_iter()
            .filter_map(|e| match e {
                Event::AliveCellsCount { cells_count, .. } => Some(cells_count),
                _ => None,
            })
            .collect();
        assert!(!reports.is_empty());
        assert!(reports.iter().all(|&count| count == 5));
    }

    #[tokio::test]
    async fn test_missing_image_fails_before_starting() {
        let broker = BrokerHandle::spawn(local_pool(1));
        let (events_tx, _events) = mpsc::channel(16);
        let (_commands, commands_rx) = mpsc::channel(1);
        let distributor = Distributor::new(params(4, 1), broker.clone(), MemoryIo::new(), events_tx);
        assert!(matches!(
            distributor.run(commands_rx).await,
            Err(DistributorError::Io(IoError::Missing(_)))
        ));
        assert_eq!(broker.status().await.unwrap(), Status::Idle);
    }
}
