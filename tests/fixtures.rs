#![allow(dead_code)]
use byteorder::{LittleEndian, WriteBytesExt};
use evtx_carve::chunk_header::header_checksum;
use evtx_carve::{
    CHUNK_MAGIC, Chunk, ChunkDecoder, DecodedEvent, EVTX_CHUNK_HEADER_SIZE, EVTX_CHUNK_SIZE,
    EventSink, Result,
};
use jiff::Timestamp;
use serde_json::json;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use std::sync::Once;

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
            .init();
    });
}

pub fn samples_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("samples")
        .canonicalize()
        .unwrap()
}

/// One chunk holding records 1 to 4. Record 2 has corrupt BinXML, record 4 has no
/// `TimeCreated`. Records 1 and 3 were created at `BASE_TIME` and two minutes later.
pub fn regular_sample() -> PathBuf {
    samples_dir().join("carve-sample.evtx")
}

/// Offset of the only chunk in [`regular_sample`].
pub const REGULAR_SAMPLE_CHUNK_OFFSET: u64 = 4096;

/// Counts the bytes handed out by `inner`.
pub struct CountingReader<R> {
    pub inner: R,
    pub read: Arc<AtomicUsize>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }
}

/// Creation time of the first synthetic event, 2017-01-02T10:00:00Z.
pub const BASE_TIME: i64 = 1_483_351_200;

/// A chunk with a valid header whose record area holds one little endian `i64` Unix time
/// per event. Record ids start at `first_record_id`; event `n` is created `n` minutes after
/// `BASE_TIME`.
pub fn synthetic_chunk(first_record_id: u64, event_count: usize) -> Vec<u8> {
    assert!(event_count > 0);
    let mut data = vec![0_u8; EVTX_CHUNK_SIZE];
    data[..8].copy_from_slice(CHUNK_MAGIC);

    let last_record_id = first_record_id + event_count as u64 - 1;
    let free_space_offset = EVTX_CHUNK_HEADER_SIZE + 8 * event_count;

    {
        let mut w = Cursor::new(&mut data[..]);
        w.set_position(8);
        w.write_u64::<LittleEndian>(first_record_id).unwrap();
        w.write_u64::<LittleEndian>(last_record_id).unwrap();
        w.write_u64::<LittleEndian>(first_record_id).unwrap();
        w.write_u64::<LittleEndian>(last_record_id).unwrap();
        w.write_u32::<LittleEndian>(128).unwrap();
        w.write_u32::<LittleEndian>((free_space_offset - 8) as u32).unwrap();
        w.write_u32::<LittleEndian>(free_space_offset as u32).unwrap();

        w.set_position(EVTX_CHUNK_HEADER_SIZE as u64);
        for n in 0..event_count as u64 {
            let minutes_in = (first_record_id + n) as i64 - 1;
            w.write_i64::<LittleEndian>(BASE_TIME + 60 * minutes_in).unwrap();
        }
    }

    let events_checksum = crc32fast::hash(&data[EVTX_CHUNK_HEADER_SIZE..free_space_offset]);
    data[52..56].copy_from_slice(&events_checksum.to_le_bytes());
    let header_chunk_checksum = header_checksum(&data);
    data[124..128].copy_from_slice(&header_chunk_checksum.to_le_bytes());

    data
}

/// Magic followed by garbage, like a stray signature inside unrelated data.
pub fn false_positive_chunk() -> Vec<u8> {
    let mut data: Vec<u8> = (0..EVTX_CHUNK_SIZE).map(|i| (i % 251) as u8).collect();
    data[..8].copy_from_slice(CHUNK_MAGIC);
    data
}

/// Concatenates chunks, separated by `gap` bytes of zeroes, returning the image and the
/// offset of every chunk.
pub fn image_of(chunks: &[Vec<u8>], gap: usize) -> (Vec<u8>, Vec<u64>) {
    let mut image = Vec::new();
    let mut offsets = Vec::new();

    for chunk in chunks {
        image.extend(std::iter::repeat_n(0_u8, gap));
        offsets.push(image.len() as u64);
        image.extend_from_slice(chunk);
    }
    image.extend(std::iter::repeat_n(0_u8, gap));

    (image, offsets)
}

pub fn event(record_id: u64, time: Option<Timestamp>) -> DecodedEvent {
    let system = match time {
        Some(t) => json!({
            "EventRecordID": record_id,
            "TimeCreated": {"#attributes": {"SystemTime": t.to_string()}}
        }),
        None => json!({ "EventRecordID": record_id }),
    };

    DecodedEvent::new(Some(record_id), json!({ "Event": { "System": system } }))
}

/// Decodes chunks produced by [`synthetic_chunk`].
pub struct SyntheticDecoder;

impl ChunkDecoder for SyntheticDecoder {
    fn decode_events(&self, chunk: Chunk, sink: &mut EventSink<'_>) -> Result<usize> {
        let record_area =
            &chunk.data[EVTX_CHUNK_HEADER_SIZE..chunk.header.free_space_offset as usize];

        let mut decoded = 0;
        for (n, raw) in record_area.chunks_exact(8).enumerate() {
            let secs = i64::from_le_bytes(raw.try_into().unwrap());
            let record_id = chunk.header.first_event_record_id + n as u64;

            sink(event(record_id, Timestamp::from_second(secs).ok()))?;
            decoded += 1;
        }

        Ok(decoded)
    }
}
