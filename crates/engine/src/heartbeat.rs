//! Job liveness and progress reporting.
//!
//! The monitor runs beside the control thread for the whole job. It never
//! touches the data stream: it reads the job counters and hands a snapshot
//! to the control-side callback at each tick. Stopping is synchronous so a
//! finished job never reports progress after its summary.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, select, tick, Sender};
use tracing::debug;

use crate::job::{JobContext, ProgressSnapshot};

/// Periodic progress reporter for one job.
pub struct HeartbeatMonitor {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    /// Starts the monitor; `on_progress` runs on the monitor thread at
    /// every tick until [`Self::stop`].
    pub fn start<F>(jcr: Arc<JobContext>, mut on_progress: F) -> Self
    where
        F: FnMut(ProgressSnapshot) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let interval = jcr.config.progress_interval;
        let handle = std::thread::spawn(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        let snapshot = jcr.snapshot();
                        debug!(
                            files = snapshot.files_sent,
                            bytes = snapshot.bytes_sent,
                            errors = snapshot.job_errors,
                            "progress"
                        );
                        on_progress(snapshot);
                    }
                }
            }
        });
        Self {
            stop: stop_tx,
            handle: Some(handle),
        }
    }

    /// Stops the monitor and waits for its thread to exit.
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
