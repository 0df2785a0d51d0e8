use crate::decoder::{DecodedEvent, EventSink};
use crate::err::{CarveError, Result};

use evtx::{EvtxParser, ParserSettings};
use log::{info, warn};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub events: usize,
    /// Records the parser failed to decode.
    pub failed: usize,
}

/// Decodes every record of a well-formed EVTX file, in file order.
///
/// Fails if the file cannot be opened or its file header is invalid. Records that fail to
/// decode are logged and skipped.
pub fn dump_file(
    path: impl AsRef<Path>,
    settings: ParserSettings,
    sink: &mut EventSink<'_>,
) -> Result<DumpSummary> {
    let path = path.as_ref();

    let mut parser = EvtxParser::from_path(path)
        .map_err(|e| CarveError::FailedToParseFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .with_configuration(settings);

    let mut summary = DumpSummary::default();

    for record in parser.records_json_value() {
        match record {
            Ok(record) => {
                sink(DecodedEvent::from(record))?;
                summary.events += 1;
            }
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                summary.failed += 1;
            }
        }
    }

    info!(
        "{}: {} event(s), {} record(s) failed to decode",
        path.display(),
        summary.events,
        summary.failed
    );

    Ok(summary)
}
