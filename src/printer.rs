use crate::decoder::DecodedEvent;
use crate::err::{CarveError, Result};
use crate::time_window::TimeWindow;

use log::error;
use std::io::Write;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSettings {
    timestamp_prefix: bool,
    window: TimeWindow,
}

impl OutputSettings {
    pub fn new() -> Self {
        OutputSettings::default()
    }

    /// Prefix every line with the event creation time as Unix seconds, `<secs>: <record>`.
    pub fn timestamp_prefix(mut self, timestamp_prefix: bool) -> Self {
        self.timestamp_prefix = timestamp_prefix;
        self
    }

    pub fn window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }
}

/// What happened to an event handed to [`EventPrinter::print`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Printed,
    OutsideWindow,
    /// Timestamp prefix requested but the record has no creation time.
    MissingTimestamp,
}

pub struct EventPrinter<W: Write> {
    settings: OutputSettings,
    output: W,
}

impl<W: Write> EventPrinter<W> {
    pub fn new(output: W, settings: OutputSettings) -> Self {
        EventPrinter { settings, output }
    }

    pub fn print(&mut self, event: &DecodedEvent) -> Result<Disposition> {
        let timestamp = event.timestamp();

        // Records without a creation time are never dropped by the window.
        if let Some(t) = timestamp {
            if !self.settings.window.contains(t) {
                return Ok(Disposition::OutsideWindow);
            }
        }

        let line = event.to_line()?;

        let written = match (self.settings.timestamp_prefix, timestamp) {
            (true, Some(t)) => writeln!(self.output, "{}: {}", t.as_second(), line),
            (true, None) => {
                error!("Event time not found: {}", line);
                return Ok(Disposition::MissingTimestamp);
            }
            (false, _) => writeln!(self.output, "{}", line),
        };

        written.map_err(|source| CarveError::Output { source })?;
        Ok(Disposition::Printed)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.output
            .flush()
            .map_err(|source| CarveError::Output { source })
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}
