//! Bounded worker pool draining file names into the reconciler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;

/// Capacity of the shared work queue.
pub const QUEUE_CAPACITY: usize = 256;

/// One unit of work: a file name observed in the watched directory.
/// Implemented by the reconciler; tests substitute counters.
pub trait FileProcessor: Send + Sync {
    fn process_file(&self, name: &str);
}

pub struct WorkerPool {
    file_sender: Sender<String>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(processor: Arc<dyn FileProcessor>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (file_sender, file_receiver) = bounded::<String>(QUEUE_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let receiver = file_receiver.clone();
            let processor = Arc::clone(&processor);
            let shutdown_flag = Arc::clone(&shutdown);
            workers.push(thread::spawn(move || {
                run_worker(worker_id, receiver, processor, shutdown_flag);
            }));
        }

        info!("Started {} workers", worker_count);

        Self {
            file_sender,
            workers,
            shutdown,
        }
    }

    /// Enqueues one file name, blocking while the queue is full.
    pub fn submit(&self, name: String) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }
        self.file_sender
            .send(name)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// A clone of the work-queue sender, for the watcher feeder thread.
    pub fn sender(&self) -> Sender<String> {
        self.file_sender.clone()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Closes the queue and joins every worker. Watch-mode callers must drop
    /// their cloned senders first or this blocks forever.
    pub fn wait(self) {
        drop(self.file_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    receiver: Receiver<String>,
    processor: Arc<dyn FileProcessor>,
    shutdown: Arc<AtomicBool>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(name) => {
                debug!("Worker {} processing {}", worker_id, name);
                processor.process_file(&name);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} file channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
