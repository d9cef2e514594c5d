//! Background texture loader
//!
//! One dedicated worker thread drains a FIFO queue of texture data waiting
//! to be decoded. The queue is deduplicated by texture identity, pending
//! jobs can be cancelled, and shutdown abandons whatever is still queued.

use crate::error::{Result, TextureError};
use crate::texture::{LoadOutcome, TextureData, TextureId};
use ahash::AHashMap;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Completion notice sent by the worker after each job
#[derive(Clone, Debug)]
pub struct LoadEvent {
    pub id: TextureId,
    pub outcome: LoadOutcome,
}

#[derive(Default)]
struct LoadQueue {
    jobs: BTreeMap<u64, Arc<TextureData>>,
    index: AHashMap<TextureId, u64>,
    next_seq: u64,
    in_flight: Option<TextureId>,
    exit: bool,
}

impl LoadQueue {
    fn push(&mut self, data: Arc<TextureData>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(data.id(), seq);
        self.jobs.insert(seq, data);
    }

    fn pop_front(&mut self) -> Option<Arc<TextureData>> {
        let (_, data) = self.jobs.pop_first()?;
        self.index.remove(&data.id());
        self.in_flight = Some(data.id());
        Some(data)
    }
}

struct Shared {
    queue: Mutex<LoadQueue>,
    wake: Condvar,
}

/// Single background worker decoding textures in request order.
pub struct TextureLoader {
    shared: Arc<Shared>,
    events: Receiver<LoadEvent>,
    worker: Option<JoinHandle<()>>,
}

impl TextureLoader {
    /// Start the worker thread
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(LoadQueue::default()),
            wake: Condvar::new(),
        });
        let (events_tx, events) = channel::unbounded();

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("texture-loader".to_string())
            .spawn(move || run_worker(worker_shared, events_tx))
            .map_err(|e| TextureError::LoaderSpawn(e.to_string()))?;

        Ok(Self {
            shared,
            events,
            worker: Some(worker),
        })
    }

    /// Queue `data` for decoding.
    ///
    /// Returns false without queueing if the loader is shutting down, the
    /// data is already queued, or it is not waiting for a load.
    pub fn load(&self, data: &Arc<TextureData>) -> bool {
        let mut queue = self.shared.queue.lock();
        if queue.exit {
            tracing::trace!(texture = data.id().raw(), "loader exiting, load ignored");
            return false;
        }
        if queue.index.contains_key(&data.id()) || !data.mark_queued() {
            return false;
        }
        queue.push(Arc::clone(data));
        tracing::trace!(texture = data.id().raw(), pending = queue.jobs.len(), "texture queued");
        drop(queue);

        self.shared.wake.notify_one();
        true
    }

    /// Cancel a pending load. Jobs already being decoded are left alone.
    pub fn remove(&self, data: &TextureData) -> bool {
        let mut queue = self.shared.queue.lock();
        match queue.index.remove(&data.id()) {
            Some(seq) => {
                queue.jobs.remove(&seq);
                data.cancel_queued();
                true
            }
            None => false,
        }
    }

    /// Number of jobs waiting to be picked up
    pub fn queue_size(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    /// Estimated bytes the pending jobs will occupy once decoded
    pub fn queued_bytes(&self) -> usize {
        self.shared
            .queue
            .lock()
            .jobs
            .values()
            .map(|data| data.footprint())
            .sum()
    }

    pub fn is_queued(&self, data: &TextureData) -> bool {
        self.shared.queue.lock().index.contains_key(&data.id())
    }

    /// Texture currently being decoded by the worker
    pub fn in_flight(&self) -> Option<TextureId> {
        self.shared.queue.lock().in_flight
    }

    pub fn is_exiting(&self) -> bool {
        self.shared.queue.lock().exit
    }

    /// Completion notices, one per job the worker finished
    pub fn events(&self) -> Receiver<LoadEvent> {
        self.events.clone()
    }

    /// Stop accepting work and let the worker finish.
    ///
    /// Queued jobs are abandoned; a decode already running completes first.
    pub fn set_exit(&self) {
        let mut queue = self.shared.queue.lock();
        if queue.exit {
            return;
        }
        queue.exit = true;

        let abandoned = queue.jobs.len();
        for data in std::mem::take(&mut queue.jobs).into_values() {
            data.cancel_queued();
        }
        queue.index.clear();
        drop(queue);

        tracing::debug!(abandoned, "texture loader shutting down");
        self.shared.wake.notify_all();
    }
}

impl Drop for TextureLoader {
    fn drop(&mut self) {
        self.set_exit();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("texture loader worker panicked");
            }
        }
    }
}

fn run_worker(shared: Arc<Shared>, events: Sender<LoadEvent>) {
    loop {
        let data = {
            let mut queue = shared.queue.lock();
            while queue.jobs.is_empty() && !queue.exit {
                shared.wake.wait(&mut queue);
            }
            if queue.exit {
                break;
            }
            match queue.pop_front() {
                Some(data) => data,
                None => continue,
            }
        };

        // Decode without holding the queue lock
        let outcome = data.load_queued();
        shared.queue.lock().in_flight = None;

        tracing::trace!(texture = data.id().raw(), ?outcome, "texture load finished");
        // Nobody listening is fine
        let _ = events.send(LoadEvent {
            id: data.id(),
            outcome,
        });
    }
    tracing::debug!("texture loader worker stopped");
}
