use crate::err::{CarveError, Result};

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt::{Debug, Formatter};
use std::io::{Cursor, Read, Seek, SeekFrom};

pub const EVTX_CHUNK_SIZE: usize = 65536;
pub const EVTX_CHUNK_HEADER_SIZE: usize = 512;
pub const CHUNK_MAGIC: &[u8; 8] = b"ElfChnk\x00";

/// Value of the `header_size` field in every chunk written by Windows.
const EXPECTED_HEADER_SIZE: u32 = 128;

#[derive(PartialEq, Eq, Clone)]
pub struct ChunkHeader {
    pub first_event_record_number: u64,
    pub last_event_record_number: u64,
    pub first_event_record_id: u64,
    pub last_event_record_id: u64,
    pub header_size: u32,
    pub last_event_record_data_offset: u32,
    pub free_space_offset: u32,
    pub events_checksum: u32,
    pub header_chunk_checksum: u32,
}

impl Debug for ChunkHeader {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("ChunkHeader")
            .field("first_event_record_id", &self.first_event_record_id)
            .field("last_event_record_id", &self.last_event_record_id)
            .field("checksum", &self.header_chunk_checksum)
            .field("free_space_offset", &self.free_space_offset)
            .finish()
    }
}

impl ChunkHeader {
    /// Reads the fixed part of a chunk header. `offset` is only used for error reporting.
    pub fn from_bytes(data: &[u8], offset: u64) -> Result<ChunkHeader> {
        let mut input = Cursor::new(data);

        let mut magic = [0_u8; 8];
        input
            .read_exact(&mut magic)
            .map_err(|source| CarveError::TruncatedChunk { offset, source })?;

        if &magic != CHUNK_MAGIC {
            return Err(CarveError::InvalidChunkMagic { offset, magic });
        }

        let truncated = |source| CarveError::TruncatedChunk { offset, source };

        let first_event_record_number = input.read_u64::<LittleEndian>().map_err(truncated)?;
        let last_event_record_number = input.read_u64::<LittleEndian>().map_err(truncated)?;
        let first_event_record_id = input.read_u64::<LittleEndian>().map_err(truncated)?;
        let last_event_record_id = input.read_u64::<LittleEndian>().map_err(truncated)?;

        let header_size = input.read_u32::<LittleEndian>().map_err(truncated)?;
        let last_event_record_data_offset = input.read_u32::<LittleEndian>().map_err(truncated)?;
        let free_space_offset = input.read_u32::<LittleEndian>().map_err(truncated)?;
        let events_checksum = input.read_u32::<LittleEndian>().map_err(truncated)?;

        // Reserved + flags
        input.seek(SeekFrom::Current(64 + 4))?;

        let header_chunk_checksum = input.read_u32::<LittleEndian>().map_err(truncated)?;

        Ok(ChunkHeader {
            first_event_record_number,
            last_event_record_number,
            first_event_record_id,
            last_event_record_id,
            header_size,
            last_event_record_data_offset,
            free_space_offset,
            events_checksum,
            header_chunk_checksum,
        })
    }

    /// Structural sanity checks, plus CRC32 verification when `validate_checksums` is set.
    /// `data` is the whole chunk, header included.
    ///
    /// A false positive magic match inside unrelated data almost never survives the
    /// structural checks alone.
    pub fn validate(&self, data: &[u8], offset: u64, validate_checksums: bool) -> Result<()> {
        if self.header_size != EXPECTED_HEADER_SIZE {
            return Err(CarveError::InvalidHeaderSize {
                offset,
                header_size: self.header_size,
            });
        }

        let free_space_offset = self.free_space_offset as usize;
        if free_space_offset < EVTX_CHUNK_HEADER_SIZE
            || free_space_offset > data.len().min(EVTX_CHUNK_SIZE)
        {
            return Err(CarveError::InvalidFreeSpaceOffset {
                offset,
                free_space_offset: self.free_space_offset,
            });
        }

        if self.first_event_record_id > self.last_event_record_id {
            return Err(CarveError::InvalidRecordRange {
                offset,
                first: self.first_event_record_id,
                last: self.last_event_record_id,
            });
        }

        if validate_checksums {
            let found = header_checksum(data);
            if found != self.header_chunk_checksum {
                return Err(CarveError::InvalidHeaderChecksum {
                    offset,
                    expected: self.header_chunk_checksum,
                    found,
                });
            }

            let found = crc32fast::hash(&data[EVTX_CHUNK_HEADER_SIZE..free_space_offset]);
            if found != self.events_checksum {
                return Err(CarveError::InvalidDataChecksum {
                    offset,
                    expected: self.events_checksum,
                    found,
                });
            }
        }

        Ok(())
    }

    /// Number of records the header claims to hold, saturating at `u64::MAX`.
    pub fn record_count(&self) -> u64 {
        self.last_event_record_id
            .saturating_sub(self.first_event_record_id)
            .saturating_add(1)
    }
}

/// CRC32 of the first 120 bytes and bytes 128..512, skipping the flags and checksum fields.
pub fn header_checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..120]);
    hasher.update(&data[128..EVTX_CHUNK_HEADER_SIZE]);
    hasher.finalize()
}
