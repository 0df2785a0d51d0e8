//! Lazy search for chunk header signatures inside arbitrary byte streams.
//!
//! [`ChunkOffsets`] owns its read buffer instead of wrapping the source in a `BufReader`.
//! The absolute offset of `buf[0]` is tracked explicitly (`base`), so the reported offsets
//! never depend on how many bytes happen to be buffered ahead of a match.

use crate::chunk_header::CHUNK_MAGIC;
use crate::err::{CarveError, Result};

use crossbeam_channel::Receiver;
use log::{debug, trace};
use memchr::memmem::Finder;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

pub const DEFAULT_SCAN_BUFFER_SIZE: usize = 64 * 1024;

/// Number of offsets the scanner thread may run ahead of the chunk parser.
pub const OFFSET_CHANNEL_CAPACITY: usize = 42;

pub struct ChunkOffsets<R: Read> {
    reader: R,
    finder: Finder<'static>,
    buf: Vec<u8>,
    /// Absolute offset of `buf[0]` in the source.
    base: u64,
    /// Start of the not yet searched region of `buf`.
    pos: usize,
    filled: usize,
    exhausted: bool,
    stop: Option<Arc<AtomicBool>>,
}

impl<R: Read> ChunkOffsets<R> {
    /// `base_offset` is the absolute offset the reader is currently positioned at.
    pub fn new(reader: R, base_offset: u64) -> Self {
        Self::with_buffer_size(reader, base_offset, DEFAULT_SCAN_BUFFER_SIZE)
    }

    pub fn with_buffer_size(reader: R, base_offset: u64, buffer_size: usize) -> Self {
        // Room for a carried over partial signature plus at least as many fresh bytes.
        let buffer_size = buffer_size.max(2 * CHUNK_MAGIC.len());

        ChunkOffsets {
            reader,
            finder: Finder::new(CHUNK_MAGIC),
            buf: vec![0; buffer_size],
            base: base_offset,
            pos: 0,
            filled: 0,
            exhausted: false,
            stop: None,
        }
    }

    /// Once `stop` is set, the scan ends before the next read.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    fn should_stop(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::Relaxed))
    }

    /// Drops everything already searched, keeping a tail that may hold the beginning of a
    /// signature, then reads more data after it.
    fn refill(&mut self) {
        if self.should_stop() {
            debug!(
                "Chunk scan stopped @ offset {}",
                self.base + self.filled as u64
            );
            self.exhausted = true;
            return;
        }

        let keep_from = self
            .pos
            .max(self.filled.saturating_sub(CHUNK_MAGIC.len() - 1));

        self.buf.copy_within(keep_from..self.filled, 0);
        self.base += keep_from as u64;
        self.filled -= keep_from;
        self.pos = 0;

        loop {
            match self.reader.read(&mut self.buf[self.filled..]) {
                Ok(0) => {
                    self.exhausted = true;
                    return;
                }
                Ok(n) => {
                    trace!("Read {} bytes @ offset {}", n, self.base + self.filled as u64);
                    self.filled += n;
                    return;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(
                        "Stopped scanning for chunks @ offset {}: {}",
                        self.base + self.filled as u64,
                        e
                    );
                    self.exhausted = true;
                    return;
                }
            }
        }
    }
}

impl<R: Read> Iterator for ChunkOffsets<R> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            if let Some(idx) = self.finder.find(&self.buf[self.pos..self.filled]) {
                let found_at = self.pos + idx;
                self.pos = found_at + 1;
                return Some(self.base + found_at as u64);
            }

            if self.exhausted {
                return None;
            }

            self.refill();
        }
    }
}

/// Offsets produced by a [`ChunkOffsets`] scan running on a background thread.
///
/// Dropping the scanner stops the thread and waits for it, so the source is released
/// by the time the drop returns.
pub struct OffsetScanner {
    offsets: Option<Receiver<u64>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Iterator for OffsetScanner {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.offsets.as_ref()?.recv().ok()
    }
}

impl Drop for OffsetScanner {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Disconnecting wakes a producer blocked on a full channel.
        self.offsets.take();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("Chunk scanner thread panicked");
            }
        }
    }
}

/// Runs a [`ChunkOffsets`] scan on a background thread.
///
/// At most `capacity` offsets are queued ahead of the consumer.
pub fn spawn_offset_scanner<R>(
    reader: R,
    base_offset: u64,
    buffer_size: usize,
    capacity: usize,
) -> Result<OffsetScanner>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let stop = Arc::new(AtomicBool::new(false));
    let offsets = ChunkOffsets::with_buffer_size(reader, base_offset, buffer_size)
        .with_stop_flag(Arc::clone(&stop));

    let handle = thread::Builder::new()
        .name("evtx-chunk-scanner".into())
        .spawn(move || {
            for offset in offsets {
                if tx.send(offset).is_err() {
                    debug!("Chunk offset consumer went away, stopping scan");
                    return;
                }
            }
        })
        .map_err(|source| CarveError::FailedToSpawnScanner { source })?;

    Ok(OffsetScanner {
        offsets: Some(rx),
        stop,
        handle: Some(handle),
    })
}
