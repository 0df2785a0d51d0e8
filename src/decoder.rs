use crate::carver::Chunk;
use crate::err::{CarveError, Result};
use crate::time_window::parse_system_time;

use evtx::{EvtxChunkData, ParserSettings, SerializedEvtxRecord};
use jiff::Timestamp;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;

/// Receives every decoded event. Returning an error aborts the current file.
pub type EventSink<'a> = dyn FnMut(DecodedEvent) -> Result<()> + 'a;

/// A single record, already rendered as a JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub record_id: Option<u64>,
    pub data: Value,
}

impl DecodedEvent {
    pub fn new(record_id: Option<u64>, data: Value) -> Self {
        DecodedEvent { record_id, data }
    }

    /// `Event/System/TimeCreated/@SystemTime`, as rendered by either JSON attribute layout.
    pub fn timestamp(&self) -> Option<Timestamp> {
        let system_time = self
            .data
            .pointer("/Event/System/TimeCreated/#attributes/SystemTime")
            .or_else(|| {
                self.data
                    .pointer("/Event/System/TimeCreated_attributes/SystemTime")
            })?;

        parse_system_time(system_time.as_str()?)
    }

    /// Compact single line JSON.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.data)?)
    }
}

impl From<SerializedEvtxRecord<Value>> for DecodedEvent {
    fn from(record: SerializedEvtxRecord<Value>) -> Self {
        DecodedEvent::new(Some(record.event_record_id), record.data)
    }
}

/// Turns a validated chunk into its events.
///
/// Implementations should skip records they cannot decode and only fail for problems
/// that make the whole chunk unusable, or when `sink` fails.
pub trait ChunkDecoder {
    fn decode_events(&self, chunk: Chunk, sink: &mut EventSink<'_>) -> Result<usize>;
}

/// Decodes chunks with the `evtx` crate.
pub struct EvtxChunkDecoder {
    settings: Arc<ParserSettings>,
}

impl EvtxChunkDecoder {
    pub fn new(settings: ParserSettings) -> Self {
        EvtxChunkDecoder {
            settings: Arc::new(settings),
        }
    }
}

impl Default for EvtxChunkDecoder {
    fn default() -> Self {
        EvtxChunkDecoder::new(ParserSettings::default())
    }
}

impl ChunkDecoder for EvtxChunkDecoder {
    fn decode_events(&self, chunk: Chunk, sink: &mut EventSink<'_>) -> Result<usize> {
        let offset = chunk.offset;

        // Checksums were already handled while fetching the chunk.
        let mut chunk_data = EvtxChunkData::new(chunk.data, false).map_err(|e| {
            CarveError::FailedToDecodeChunk {
                offset,
                message: e.to_string(),
            }
        })?;

        let mut parsed = chunk_data.parse(Arc::clone(&self.settings)).map_err(|e| {
            CarveError::FailedToDecodeChunk {
                offset,
                message: e.to_string(),
            }
        })?;

        let mut decoded = 0;
        for record in parsed.iter() {
            let record = match record.and_then(|r| r.into_json_value()) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Chunk @ offset {}: skipping record: {}", offset, e);
                    continue;
                }
            };

            debug!("Chunk @ offset {}: record {}", offset, record.event_record_id);
            sink(DecodedEvent::from(record))?;
            decoded += 1;
        }

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_timestamp_from_nested_attributes() {
        let event = DecodedEvent::new(
            Some(1),
            json!({
                "Event": {
                    "#attributes": {"xmlns": "http://schemas.microsoft.com/win/2004/08/events/event"},
                    "System": {
                        "EventID": 4624,
                        "TimeCreated": {"#attributes": {"SystemTime": "2016-07-08T18:12:51.681640Z"}}
                    }
                }
            }),
        );

        let ts = event.timestamp().unwrap();
        assert_eq!(ts.as_second(), 1_468_001_571);
    }

    #[test]
    fn test_timestamp_from_separated_attributes() {
        let event = DecodedEvent::new(
            None,
            json!({
                "Event": {
                    "System": {
                        "TimeCreated": null,
                        "TimeCreated_attributes": {"SystemTime": "2016-07-08T18:12:51Z"}
                    }
                }
            }),
        );

        assert_eq!(event.timestamp().unwrap().as_second(), 1_468_001_571);
    }

    #[test]
    fn test_missing_or_garbled_timestamp() {
        let no_time = DecodedEvent::new(None, json!({"Event": {"System": {"EventID": 1}}}));
        assert_eq!(no_time.timestamp(), None);

        let garbled = DecodedEvent::new(
            None,
            json!({"Event": {"System": {"TimeCreated": {"#attributes": {"SystemTime": "yesterday"}}}}}),
        );
        assert_eq!(garbled.timestamp(), None);
    }

    #[test]
    fn test_line_is_compact_json() {
        let event = DecodedEvent::new(Some(7), json!({"Event": {"System": {"EventID": 7}}}));
        assert_eq!(event.to_line().unwrap(), r#"{"Event":{"System":{"EventID":7}}}"#);
    }
}
