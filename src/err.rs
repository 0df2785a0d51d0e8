use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CarveError>;

#[derive(Debug, Error)]
pub enum CarveError {
    #[error("An I/O error has occurred: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("Failed to open file {}: {}", path.display(), source)]
    FailedToOpenFile { path: PathBuf, source: io::Error },

    #[error("Failed to parse EVTX file {}: {}", path.display(), message)]
    FailedToParseFile { path: PathBuf, message: String },

    #[error("Failed to spawn chunk scanner thread: {source}")]
    FailedToSpawnScanner { source: io::Error },

    /// Errors related to chunk validation
    #[error("Offset {offset}: reached EOF while reading a chunk: {source}")]
    TruncatedChunk { offset: u64, source: io::Error },

    #[error(
        "Offset {offset}: invalid EVTX chunk header magic, expected `ElfChnk0`, found `{magic:2X?}`"
    )]
    InvalidChunkMagic { offset: u64, magic: [u8; 8] },

    #[error("Offset {offset}: invalid chunk header size {header_size}, expected 128")]
    InvalidHeaderSize { offset: u64, header_size: u32 },

    #[error("Offset {offset}: free space offset {free_space_offset} lies outside of the chunk")]
    InvalidFreeSpaceOffset { offset: u64, free_space_offset: u32 },

    #[error("Offset {offset}: event record range is reversed ({first} > {last})")]
    InvalidRecordRange { offset: u64, first: u64, last: u64 },

    #[error("Offset {offset}: chunk header CRC32 invalid (expected {expected:#010x}, found {found:#010x})")]
    InvalidHeaderChecksum {
        offset: u64,
        expected: u32,
        found: u32,
    },

    #[error("Offset {offset}: chunk data CRC32 invalid (expected {expected:#010x}, found {found:#010x})")]
    InvalidDataChecksum {
        offset: u64,
        expected: u32,
        found: u32,
    },

    #[error("Offset {offset}: failed to decode chunk, caused by:\n\t {message}")]
    FailedToDecodeChunk { offset: u64, message: String },

    /// Errors related to output
    #[error("Failed to write output: {source}")]
    Output { source: io::Error },

    #[error("`serde_json` failed with error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error(
        "Invalid datetime `{input}`, expected an RFC 3339 timestamp or `YYYY-MM-DD[ HH:MM[:SS]]`"
    )]
    InvalidDateTime { input: String },
}

impl CarveError {
    /// Output failures abort processing, everything else is recovered from.
    pub fn is_output_failure(&self) -> bool {
        matches!(self, CarveError::Output { .. } | CarveError::Json { .. })
    }
}
