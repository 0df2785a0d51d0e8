mod fixtures;

use fixtures::*;

use evtx_carve::{
    CarveSettings, DecodedEvent, Disposition, EventPrinter, EvtxChunkDecoder, OutputSettings,
    ParserSettings, Result, carve_file, dump_file,
};
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_dumps_regular_sample() {
    ensure_env_logger_initialized();
    let mut events = Vec::new();
    let mut sink = |event: DecodedEvent| -> Result<()> {
        events.push(event);
        Ok(())
    };

    let summary = dump_file(regular_sample(), ParserSettings::default(), &mut sink).unwrap();

    assert_eq!(summary.events, 3);
    assert_eq!(summary.failed, 1);

    let ids: Vec<Option<u64>> = events.iter().map(|e| e.record_id).collect();
    assert_eq!(ids, vec![Some(1), Some(3), Some(4)]);

    assert_eq!(
        events[0].timestamp().map(|t| t.as_second()),
        Some(BASE_TIME)
    );
    assert_eq!(
        events[0].data.pointer("/Event/System/EventID"),
        Some(&serde_json::json!("4624"))
    );
    assert_eq!(events[2].timestamp(), None);
}

#[test]
fn test_carves_regular_sample_out_of_an_image() {
    ensure_env_logger_initialized();
    let sample = std::fs::read(regular_sample()).unwrap();

    let filler: Vec<u8> = (0..5000).map(|i| (i % 241) as u8).collect();
    let mut image = NamedTempFile::new().unwrap();
    image.write_all(&filler).unwrap();
    image.write_all(&sample).unwrap();
    image.write_all(&[0; 3000]).unwrap();
    image.flush().unwrap();

    let mut printer = EventPrinter::new(Vec::new(), OutputSettings::new().timestamp_prefix(true));
    let mut dispositions = Vec::new();
    let mut sink = |event: DecodedEvent| -> Result<()> {
        dispositions.push(printer.print(&event)?);
        Ok(())
    };

    let summary = carve_file(
        image.path(),
        &CarveSettings::new().validate_checksums(true),
        &EvtxChunkDecoder::default(),
        &mut sink,
    )
    .unwrap();
    drop(sink);

    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.rejected, 0);
    assert_eq!(summary.undecodable, 0);
    assert_eq!(summary.events, 3);
    assert_eq!(
        dispositions,
        vec![
            Disposition::Printed,
            Disposition::Printed,
            Disposition::MissingTimestamp
        ]
    );

    let output = String::from_utf8(printer.into_inner()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        format!(
            "{}: {}",
            BASE_TIME,
            r##"{"Event":{"System":{"EventID":"4624","EventRecordID":"1","TimeCreated":{"#attributes":{"SystemTime":"2017-01-02T10:00:00.000000Z"}}}}}"##
        )
    );
    assert!(lines[1].starts_with(&format!("{}: ", BASE_TIME + 120)));
}

#[test]
fn test_carve_offset_past_the_chunk_finds_nothing() {
    let mut sink = |_event: DecodedEvent| -> Result<()> { panic!("no events expected") };

    let summary = carve_file(
        regular_sample(),
        &CarveSettings::new().start_offset(REGULAR_SAMPLE_CHUNK_OFFSET + 1),
        &EvtxChunkDecoder::default(),
        &mut sink,
    )
    .unwrap();

    assert_eq!(summary.candidates, 0);
}
