//! Debounced create-event watcher for the drop zone.
//!
//! Create events feed a pending map keyed by file name; a ~250 ms loop emits
//! names whose first sighting is older than 300 ms. The stability window
//! lets writers finish before a worker opens the file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{SendError, Sender};
use log::{error, info, warn};
use notify::{EventKind, RecursiveMode, Watcher};

use crate::error::WorkerError;

const TICK: Duration = Duration::from_millis(250);
const STABILITY: Duration = Duration::from_millis(300);

/// Emits every pending name older than the stability window. Errors only
/// when the receiving side is gone.
pub(crate) fn drain_expired(
    pending: &mut HashMap<String, Instant>,
    now: Instant,
    out: &Sender<String>,
) -> Result<(), SendError<String>> {
    let expired: Vec<String> = pending
        .iter()
        .filter(|(_, first_seen)| now.duration_since(**first_seen) > STABILITY)
        .map(|(name, _)| name.clone())
        .collect();
    for name in expired {
        pending.remove(&name);
        out.send(name)?;
    }
    Ok(())
}

/// Watches `dir` for created files and forwards debounced names into `out`.
/// Runs until `shutdown` is set or the forwarding channel closes.
pub fn watch(dir: &Path, out: Sender<String>, shutdown: Arc<AtomicBool>) -> Result<(), WorkerError> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher =
        notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = tx.send(event);
        })
        .map_err(|e| WorkerError::Watch(e.to_string()))?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| WorkerError::Watch(e.to_string()))?;
    info!("Watching {} (debounced)...", dir.display());

    let mut pending: HashMap<String, Instant> = HashMap::new();
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Watch mode shutting down...");
            break;
        }

        match rx.recv_timeout(TICK) {
            Ok(Ok(event)) => {
                if matches!(event.kind, EventKind::Create(_)) {
                    for path in &event.paths {
                        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                            continue;
                        };
                        // Recognizer temp artifacts never enter the queue.
                        if name.contains(".ocr.") {
                            continue;
                        }
                        pending.entry(name.to_string()).or_insert_with(Instant::now);
                    }
                }
            }
            Ok(Err(e)) => warn!("watch error: {e}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                error!("watch channel disconnected");
                break;
            }
        }

        if drain_expired(&mut pending, Instant::now(), &out).is_err() {
            // Worker side is gone; nothing left to feed.
            break;
        }
    }
    Ok(())
}
