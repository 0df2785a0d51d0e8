#![deny(unused_must_use)]
#![forbid(unsafe_code)]
//! Dump and carve Windows XML Event Log (EVTX) records.
//!
//! Well-formed files are read with [`dump_file`]. Damaged files and raw images are
//! scanned for chunk headers with [`carve_file`], which recovers every chunk that still
//! validates. Record decoding itself is delegated to the [`evtx`] crate.
//!
//! ```no_run
//! use evtx_carve::{CarveSettings, EvtxChunkDecoder, carve_file};
//!
//! let decoder = EvtxChunkDecoder::default();
//! let mut sink = |event: evtx_carve::DecodedEvent| -> evtx_carve::Result<()> {
//!     println!("{}", event.to_line()?);
//!     Ok(())
//! };
//!
//! carve_file("disk.img", &CarveSettings::new().limit(Some(10)), &decoder, &mut sink)
//!     .unwrap();
//! ```

pub mod carver;
pub mod chunk_header;
pub mod decoder;
pub mod dump;
pub mod err;
pub mod offset_scanner;
pub mod printer;
pub mod time_window;

pub use carver::{CarveSettings, CarveSummary, Chunk, carve, carve_file, fetch_chunk};
pub use chunk_header::{CHUNK_MAGIC, ChunkHeader, EVTX_CHUNK_HEADER_SIZE, EVTX_CHUNK_SIZE};
pub use decoder::{ChunkDecoder, DecodedEvent, EventSink, EvtxChunkDecoder};
pub use dump::{DumpSummary, dump_file};
pub use err::{CarveError, Result};
pub use offset_scanner::{ChunkOffsets, OffsetScanner, spawn_offset_scanner};
pub use printer::{Disposition, EventPrinter, OutputSettings};
pub use time_window::{TimeWindow, parse_datetime};

pub use evtx::ParserSettings;

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .is_test(true)
            .init();
    });
}
