//! Per-symbol worker host
//!
//! Each symbol gets one tokio task fed by an ordered mpsc queue. The task
//! runs stages 1-7 fresh for every input and is the only writer of that
//! symbol's stabilization record. Finished snapshots go out on a broadcast
//! channel. [`analyze_batch`] is the offline counterpart: stages 1-7 fanned
//! out across symbols with rayon.

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::scenario::{ScenarioStore, StableScenarioState};
use crate::snapshot::{analyze, Analysis, Snapshot, SnapshotInput};

/// Queue depth per symbol
const QUEUE_CAPACITY: usize = 256;
/// Broadcast buffer for finished snapshots
const EVENT_CAPACITY: usize = 1000;

struct Worker {
    tx: mpsc::Sender<SnapshotInput>,
    task: JoinHandle<Option<StableScenarioState>>,
}

/// Routes snapshot inputs to one worker task per symbol
pub struct Engine {
    config: Arc<AnalysisConfig>,
    workers: HashMap<String, Worker>,
    event_tx: broadcast::Sender<Arc<Snapshot>>,
}

impl Engine {
    pub fn new(config: AnalysisConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config: Arc::new(config),
            workers: HashMap::new(),
            event_tx,
        }
    }

    /// Receive every snapshot published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.event_tx.subscribe()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    /// Queue an input behind earlier inputs for the same symbol, spawning
    /// the symbol's worker on first use
    pub async fn submit(&mut self, input: SnapshotInput) -> Result<()> {
        let symbol = input.symbol.clone();
        if !self.workers.contains_key(&symbol) {
            let worker = self.spawn_worker(&symbol);
            self.workers.insert(symbol.clone(), worker);
        }

        let worker = self
            .workers
            .get(&symbol)
            .ok_or_else(|| anyhow!("no worker for {}", symbol))?;
        worker
            .tx
            .send(input)
            .await
            .with_context(|| format!("worker for {} has stopped", symbol))
    }

    fn spawn_worker(&self, symbol: &str) -> Worker {
        let (tx, mut rx) = mpsc::channel::<SnapshotInput>(QUEUE_CAPACITY);
        let config = Arc::clone(&self.config);
        let event_tx = self.event_tx.clone();
        let symbol = symbol.to_string();

        info!("Starting worker for {}", symbol);
        let task = tokio::spawn(async move {
            let mut store = ScenarioStore::new(config.stabilizer.clone());

            while let Some(input) = rx.recv().await {
                if input.symbol != symbol {
                    warn!("worker {} received input for {}; dropped", symbol, input.symbol);
                    continue;
                }
                let snapshot = analyze(&input, &config).stabilize(&mut store);
                debug!(
                    "{}: snapshot {:?} published",
                    symbol,
                    snapshot.meta.window_end
                );
                // No subscribers is fine
                let _ = event_tx.send(Arc::new(snapshot));
            }

            info!("Worker for {} stopped", symbol);
            store.get(&symbol).cloned()
        });

        Worker { tx, task }
    }

    /// Close every queue, let workers drain, and return the final
    /// stabilization records
    pub async fn shutdown(self) -> Result<HashMap<String, StableScenarioState>> {
        let mut states = HashMap::new();
        for (symbol, worker) in self.workers {
            drop(worker.tx);
            let state = worker
                .task
                .await
                .with_context(|| format!("worker for {} panicked", symbol))?;
            if let Some(state) = state {
                states.insert(symbol, state);
            }
        }
        Ok(states)
    }
}

/// Stages 1-7 for many symbols in parallel, results in input order
pub fn analyze_batch(inputs: &[SnapshotInput], config: &AnalysisConfig) -> Vec<Analysis> {
    inputs
        .par_iter()
        .map(|input| analyze(input, config))
        .collect()
}

/// [`analyze_batch`] followed by stabilization in input order
pub fn snapshot_batch(
    inputs: &[SnapshotInput],
    config: &AnalysisConfig,
    store: &mut ScenarioStore,
) -> Vec<Snapshot> {
    analyze_batch(inputs, config)
        .into_iter()
        .map(|analysis| analysis.stabilize(store))
        .collect()
}
