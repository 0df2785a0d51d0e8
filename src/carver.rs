//! Chunk recovery from byte streams that are not well-formed EVTX files.
//!
//! Candidate offsets come from a background [`ChunkOffsets`](crate::offset_scanner::ChunkOffsets)
//! scan. Every candidate is read through a second, independent cursor, so fetching a chunk
//! never moves the scanner.

use crate::chunk_header::{ChunkHeader, EVTX_CHUNK_SIZE};
use crate::decoder::{ChunkDecoder, EventSink};
use crate::err::{CarveError, Result};
use crate::offset_scanner::{DEFAULT_SCAN_BUFFER_SIZE, OFFSET_CHANNEL_CAPACITY, spawn_offset_scanner};

use log::{debug, info, warn};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// A chunk that passed header validation.
#[derive(Debug)]
pub struct Chunk {
    /// Absolute offset of the chunk in its source.
    pub offset: u64,
    pub header: ChunkHeader,
    /// `EVTX_CHUNK_SIZE` bytes, header included.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarveSettings {
    start_offset: u64,
    limit: Option<usize>,
    validate_checksums: bool,
    scan_buffer_size: usize,
    channel_capacity: usize,
}

impl Default for CarveSettings {
    fn default() -> Self {
        CarveSettings {
            start_offset: 0,
            limit: None,
            validate_checksums: false,
            scan_buffer_size: DEFAULT_SCAN_BUFFER_SIZE,
            channel_capacity: OFFSET_CHANNEL_CAPACITY,
        }
    }
}

impl CarveSettings {
    pub fn new() -> Self {
        CarveSettings::default()
    }

    /// Absolute offset the scan starts from.
    pub fn start_offset(mut self, start_offset: u64) -> Self {
        self.start_offset = start_offset;
        self
    }

    /// Stop after this many chunks were fetched. `None` or `Some(0)` scan the whole input.
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|&l| l > 0);
        self
    }

    /// Reject chunks whose header or record area CRC32 does not match.
    ///
    /// Chunks recovered from unallocated space are often dirty, so this drops data that
    /// would otherwise decode fine.
    pub fn validate_checksums(mut self, validate_checksums: bool) -> Self {
        self.validate_checksums = validate_checksums;
        self
    }

    pub fn scan_buffer_size(mut self, scan_buffer_size: usize) -> Self {
        self.scan_buffer_size = scan_buffer_size;
        self
    }

    pub fn channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity.max(1);
        self
    }

    pub fn get_start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn get_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn should_validate_checksums(&self) -> bool {
        self.validate_checksums
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarveSummary {
    /// Offsets where the chunk magic was found.
    pub candidates: usize,
    /// Candidates that were fetched and passed validation.
    pub chunks: usize,
    /// Candidates discarded because they could not be read or validated.
    pub rejected: usize,
    /// Chunks that validated but could not be decoded.
    pub undecodable: usize,
    pub events: usize,
}

/// Reads and validates the chunk starting at `offset`.
pub fn fetch_chunk<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    validate_checksums: bool,
) -> Result<Chunk> {
    reader.seek(SeekFrom::Start(offset))?;

    let mut data = vec![0_u8; EVTX_CHUNK_SIZE];
    reader
        .read_exact(&mut data)
        .map_err(|source| CarveError::TruncatedChunk { offset, source })?;

    let header = ChunkHeader::from_bytes(&data, offset)?;
    header.validate(&data, offset, validate_checksums)?;

    debug!("Chunk @ offset {}: {:?}", offset, header);

    Ok(Chunk {
        offset,
        header,
        data,
    })
}

/// Carves every chunk found in the file at `path`, feeding decoded events to `sink`.
///
/// Only a failure to open the file or a failing `sink` is reported as an error; corrupt
/// candidates are logged and skipped.
pub fn carve_file<D: ChunkDecoder>(
    path: impl AsRef<Path>,
    settings: &CarveSettings,
    decoder: &D,
    sink: &mut EventSink<'_>,
) -> Result<CarveSummary> {
    let path = path.as_ref();
    let open = |path: &Path| {
        File::open(path).map_err(|source| CarveError::FailedToOpenFile {
            path: path.to_path_buf(),
            source,
        })
    };

    let mut scan_source = open(path)?;
    scan_source.seek(SeekFrom::Start(settings.start_offset))?;

    let mut fetch_source = open(path)?;
    fetch_source.seek(SeekFrom::Start(settings.start_offset))?;

    let summary = carve(scan_source, fetch_source, settings, decoder, sink)?;

    info!(
        "{}: {} candidate(s), {} chunk(s) carved, {} rejected, {} event(s)",
        path.display(),
        summary.candidates,
        summary.chunks,
        summary.rejected,
        summary.events
    );

    Ok(summary)
}

/// Carving over any pair of cursors on the same data.
///
/// `scan_source` must be positioned at `settings.start_offset`; it is moved to a scanner
/// thread, which is stopped and joined before this returns. `fetch_source` is seeked to
/// every candidate.
pub fn carve<S, F, D>(
    scan_source: S,
    mut fetch_source: F,
    settings: &CarveSettings,
    decoder: &D,
    sink: &mut EventSink<'_>,
) -> Result<CarveSummary>
where
    S: Read + Send + 'static,
    F: Read + Seek,
    D: ChunkDecoder,
{
    let offsets = spawn_offset_scanner(
        scan_source,
        settings.start_offset,
        settings.scan_buffer_size,
        settings.channel_capacity,
    )?;

    let mut summary = CarveSummary::default();

    for offset in offsets {
        summary.candidates += 1;
        info!("Parsing chunk @ offset {} ({:#010x})", offset, offset);

        let chunk = match fetch_chunk(&mut fetch_source, offset, settings.validate_checksums) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("{}", e);
                summary.rejected += 1;
                continue;
            }
        };
        summary.chunks += 1;

        match decoder.decode_events(chunk, sink) {
            Ok(count) => summary.events += count,
            Err(e) if e.is_output_failure() => return Err(e),
            Err(e) => {
                warn!("{}", e);
                summary.undecodable += 1;
            }
        }

        if settings.limit.is_some_and(|limit| summary.chunks >= limit) {
            debug!("Reached the limit of {} chunk(s)", summary.chunks);
            break;
        }
    }

    Ok(summary)
}
