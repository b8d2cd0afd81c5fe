// main.rs - Distributed Game of Life: run a worker, or the broker and client loop

use std::io::stdin;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use conway::{Coord, Grid, patterns};
use conway_broker::{BrokerHandle, Worker, local_pool};
use conway_distributor::{Command, Distributor, Event, ImageIo, IoError, Outcome, PgmIo};
use conway_worker::RemoteWorker;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod keys;

use config::Config;

#[derive(Parser)]
#[command(name = "conway_dist", about = "Distributed Conway's Game of Life")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the broker and the client loop.
    Run(RunArgs),
    /// Serve band updates over TCP.
    Worker {
        #[arg(long, default_value = "127.0.0.1:8030")]
        listen: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    turns: Option<u32>,
    /// Bands per turn.
    #[arg(long)]
    threads: Option<usize>,
    #[arg(long)]
    width: Option<usize>,
    #[arg(long)]
    height: Option<usize>,
    /// Number of in-process workers.
    #[arg(long)]
    local: Option<usize>,
    /// Remote worker address; repeat for more than one.
    #[arg(long = "worker")]
    workers: Vec<String>,
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    ticker_ms: Option<u64>,
    /// Seed from a named pattern instead of an image.
    #[arg(long, conflicts_with = "random")]
    pattern: Option<String>,
    /// Seed from a random fill instead of an image.
    #[arg(long)]
    random: Option<u64>,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(turns) = self.turns {
            config.params.turns = turns;
        }
        if let Some(threads) = self.threads {
            config.params.threads = threads;
        }
        if let Some(width) = self.width {
            config.params.image_width = width;
        }
        if let Some(height) = self.height {
            config.params.image_height = height;
        }
        if let Some(local) = self.local {
            config.workers.local = local;
        }
        if !self.workers.is_empty() {
            config.workers.remote = self.workers.clone();
        }
        if let Some(input) = &self.input {
            config.io.input = input.clone();
        }
        if let Some(output) = &self.output {
            config.io.output = output.clone();
        }
        if let Some(ticker_ms) = self.ticker_ms {
            config.client.ticker_ms = ticker_ms;
        }
    }

    fn seed(&self, width: usize, height: usize) -> Result<Option<Grid>> {
        if let Some(name) = &self.pattern {
            let Some(pattern) = patterns::find(name) else {
                let known: Vec<_> = patterns::PATTERNS.iter().map(|p| p.name).collect();
                bail!("unknown pattern {name:?}, expected one of {}", known.join(", "));
            };
            let origin = Coord::new(width / 2, height / 2);
            return Ok(Some(pattern.to_grid(width, height, origin)));
        }
        Ok(self.random.map(|seed| patterns::random_grid(width, height, seed)))
    }
}

/// Image files, except that the initial grid may come from a seed instead.
struct SeededIo {
    seed: Option<Grid>,
    files: PgmIo,
}

impl ImageIo for SeededIo {
    fn load(&self, name: &str, width: usize, height: usize) -> Result<Grid, IoError> {
        match &self.seed {
            Some(grid) => Ok(grid.clone()),
            None => self.files.load(name, width, height),
        }
    }

    fn save(&self, name: &str, grid: &Grid) -> Result<(), IoError> {
        self.files.save(name, grid)
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Cmd::Worker { listen } => {
            let listener = TcpListener::bind(&listen)
                .await
                .with_context(|| format!("binding {listen}"))?;
            conway_worker::serve(listener).await?;
            Ok(())
        }
        Cmd::Run(args) => {
            let outcome = run(args).await?;
            info!(?outcome, "done");
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<Outcome> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    let params = config.params();
    if params.image_width == 0 || params.image_height == 0 {
        bail!("image dimensions must be non-zero, got {}", params.input_name());
    }

    let workers: Vec<Arc<dyn Worker>> = if config.workers.remote.is_empty() {
        local_pool(config.workers.local)
    } else {
        config
            .workers
            .remote
            .iter()
            .map(|addr| Arc::new(RemoteWorker::new(addr.as_str())) as Arc<dyn Worker>)
            .collect()
    };
    info!(workers = workers.len(), ?params, "starting");
    let broker = BrokerHandle::spawn(workers);

    let io = SeededIo {
        seed: args.seed(params.image_width, params.image_height)?,
        files: PgmIo::new(&config.io.input, &config.io.output),
    };

    let (events_tx, events_rx) = mpsc::channel(1024);
    let logger = tokio::spawn(log_events(events_rx));

    let (commands_tx, commands_rx) = mpsc::channel(16);
    let keys_tx = commands_tx.clone();
    std::thread::spawn(move || keys::forward_keys(stdin().lock(), keys_tx));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, quitting");
            let _ = commands_tx.send(Command::Quit).await;
        }
    });

    let outcome = Distributor::new(params, broker, io, events_tx)
        .with_config(config.client())
        .run(commands_rx)
        .await
        .context("run failed")?;
    if let Err(e) = logger.await {
        warn!(error = %e, "event logger failed");
    }
    Ok(outcome)
}

async fn log_events(mut events: mpsc::Receiver<Event>) {
    while let Some(event) = events.recv().await {
        match event {
            Event::CellsFlipped {
                completed_turns,
                cells,
            } => debug!(turn = completed_turns, flipped = cells.len(), "cells flipped"),
            Event::TurnComplete { completed_turns } => debug!(turn = completed_turns, "turn complete"),
            Event::AliveCellsCount {
                completed_turns,
                cells_count,
            } => info!(turn = completed_turns, alive = cells_count, "alive cells"),
            Event::ImageOutputComplete {
                completed_turns,
                filename,
            } => info!(turn = completed_turns, %filename, "image written"),
            Event::StateChange {
                completed_turns,
                new_state,
            } => info!(turn = completed_turns, ?new_state, "state changed"),
            Event::FinalTurnComplete {
                completed_turns,
                alive,
            } => info!(turn = completed_turns, alive = alive.len(), "final turn complete"),
        }
    }
}
