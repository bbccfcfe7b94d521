use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use geobroker_utils::Counter;

use crate::logic::MatchingLogic;
use crate::types::{Packet, Tx};
use crate::Result;

/// A pool of workers running the matching logic.
///
/// Packets are routed by sender id, so all packets of one client are handled by the same worker
/// in the order they were dispatched. Produced packets are sent on `tx`.
pub struct Dispatcher {
    queues: Vec<mpsc::Sender<Packet>>,
    workers: Vec<JoinHandle<()>>,
    hasher: ahash::RandomState,
    processed: Arc<Counter>,
}

impl Dispatcher {
    /// Spawns the workers on the current tokio runtime.
    pub fn start(logic: Arc<dyn MatchingLogic>, workers: usize, queue_max: usize, tx: Tx) -> Self {
        let processed = Arc::new(Counter::new());
        let (queues, workers): (Vec<_>, Vec<_>) = (0..workers.max(1))
            .map(|i| {
                let (queue_tx, queue_rx) = mpsc::channel(queue_max.max(1));
                let worker = tokio::spawn(Self::run(i, logic.clone(), queue_rx, tx.clone(), processed.clone()));
                (queue_tx, worker)
            })
            .unzip();
        log::info!("started {} workers", workers.len());
        Self { queues, workers, hasher: ahash::RandomState::with_seeds(1, 2, 3, 4), processed }
    }

    async fn run(
        i: usize,
        logic: Arc<dyn MatchingLogic>,
        mut queue_rx: mpsc::Receiver<Packet>,
        tx: Tx,
        processed: Arc<Counter>,
    ) {
        while let Some(packet) = queue_rx.recv().await {
            log::trace!("worker {} processing {} from {}", i, packet.payload.kind(), packet.sender);
            for out in logic.process(packet) {
                if let Err(e) = tx.send(out) {
                    log::warn!("worker {} outbound channel closed, {:?}", i, e.0);
                    return;
                }
            }
            processed.inc();
        }
        log::debug!("worker {} exit", i);
    }

    #[inline]
    fn queue_of(&self, packet: &Packet) -> &mpsc::Sender<Packet> {
        let idx = self.hasher.hash_one(&packet.sender) as usize % self.queues.len();
        &self.queues[idx]
    }

    /// Queues the packet, waiting while the worker's queue is full.
    pub async fn dispatch(&self, packet: Packet) -> Result<()> {
        self.queue_of(&packet).send(packet).await.map_err(|e| anyhow!("worker is closed, {:?}", e.0))
    }

    /// Number of packets processed so far.
    #[inline]
    pub fn processed(&self) -> isize {
        self.processed.count()
    }

    /// Closes the queues and waits until every queued packet has been processed.
    pub async fn stop(self) -> Result<()> {
        let Self { queues, workers, .. } = self;
        drop(queues);
        for worker in workers {
            worker.await?;
        }
        Ok(())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dispatcher {{ workers: {}, processed: {} }}", self.workers.len(), self.processed())
    }
}
