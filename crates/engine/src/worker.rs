//! Bounded-queue writer task.
//!
//! Some restore targets block for arbitrarily long on write (a FIFO with no
//! reader, a slow device). Writing from the dispatch loop would stall the
//! whole job, so such targets get a dedicated writer thread fed through a
//! bounded channel: the loop enqueues plaintext chunks and keeps consuming
//! records; backpressure is the queue depth. Chunks drain in enqueue order.

use std::io::Write;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};

/// A writer task consuming chunks from a bounded queue.
#[derive(Debug)]
pub struct ChunkWriter {
    tx: Option<Sender<Vec<u8>>>,
    handle: Option<JoinHandle<std::io::Result<u64>>>,
}

impl ChunkWriter {
    /// Default queue depth.
    pub const DEFAULT_DEPTH: usize = 8;

    /// Spawns a writer over `sink` with the given queue depth.
    pub fn spawn<W>(mut sink: W, depth: usize) -> Self
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = bounded::<Vec<u8>>(depth.max(1));
        let handle = std::thread::spawn(move || {
            let mut total = 0u64;
            for chunk in rx {
                sink.write_all(&chunk)?;
                total += chunk.len() as u64;
            }
            sink.flush()?;
            Ok(total)
        });
        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Spawns a writer that opens `path` for writing from inside the task.
    ///
    /// Opening is part of the task because opening a FIFO for write blocks
    /// until a reader appears; the dispatch loop must not wait for that.
    #[must_use]
    pub fn spawn_path(path: std::path::PathBuf, depth: usize) -> Self {
        let (tx, rx) = bounded::<Vec<u8>>(depth.max(1));
        let handle = std::thread::spawn(move || {
            let mut sink = std::fs::OpenOptions::new().write(true).open(&path)?;
            let mut total = 0u64;
            for chunk in rx {
                sink.write_all(&chunk)?;
                total += chunk.len() as u64;
            }
            sink.flush()?;
            Ok(total)
        });
        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Enqueues one chunk, blocking when the queue is full.
    ///
    /// An error means the writer thread died; the deferred I/O error is
    /// reported by [`Self::finish`].
    pub fn push(&self, chunk: Vec<u8>) -> Result<(), ()> {
        match &self.tx {
            Some(tx) => tx.send(chunk).map_err(|_| ()),
            None => Err(()),
        }
    }

    /// Closes the queue, waits for the writer, and returns the bytes
    /// written or the first I/O error the writer hit.
    pub fn finish(mut self) -> std::io::Result<u64> {
        self.tx.take();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("writer task panicked"))),
            None => Ok(0),
        }
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
