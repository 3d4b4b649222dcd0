//! JSONL event files, one per UTC day.
//!
//! An event is filed under the date of its own timestamp, so a call that
//! completes just after midnight lands in the new day's file even if it
//! started the day before.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{CallEvent, EventSink};
use crate::{AppError, Result};

/// The day file currently open for appending.
struct DayFile {
    date: NaiveDate,
    out: BufWriter<File>,
}

impl DayFile {
    fn open(path: &Path, date: NaiveDate) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AppError::Io(format!("failed to open event file {}: {e}", path.display())))?;
        debug!(path = %path.display(), "opened event file");
        Ok(Self {
            date,
            out: BufWriter::new(file),
        })
    }

    fn append(&mut self, event: &CallEvent) -> Result<()> {
        serde_json::to_writer(&mut self.out, event)
            .map_err(|e| AppError::Io(format!("failed to encode {:?} event: {e}", event.event_type)))?;
        self.out
            .write_all(b"\n")
            .and_then(|()| self.out.flush())
            .map_err(|e| AppError::Io(format!("failed to append event: {e}")))
    }
}

/// Event sink appending to `<dir>/events-YYYY-MM-DD.jsonl`.
pub struct JsonlEventWriter {
    dir: PathBuf,
    current: Mutex<Option<DayFile>>,
}

impl JsonlEventWriter {
    /// Writer storing day files in `dir`, created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the directory cannot be created.
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Io(format!("failed to create event directory {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            current: Mutex::new(None),
        })
    }

    /// File holding the events stamped on `date`.
    #[must_use]
    pub fn path_for_date(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("events-{date}.jsonl"))
    }

    /// Events recorded for `date`, oldest first. A day with no file has no
    /// events.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the file cannot be read or holds a line
    /// that is not a [`CallEvent`].
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<CallEvent>> {
        let path = self.path_for_date(date);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(format!("failed to open {}: {e}", path.display()))),
        };

        let mut events = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).map_err(|e| {
                AppError::Io(format!("{} line {}: not an event: {e}", path.display(), index + 1))
            })?;
            events.push(event);
        }
        Ok(events)
    }
}

impl EventSink for JsonlEventWriter {
    fn record(&self, event: CallEvent) -> Result<()> {
        let date = event.timestamp.date_naive();

        let mut current = self
            .current
            .lock()
            .map_err(|_| AppError::Io("event writer mutex poisoned".into()))?;

        let day = match current.take() {
            Some(day) if day.date == date => current.insert(day),
            _ => current.insert(DayFile::open(&self.path_for_date(date), date)?),
        };

        day.append(&event).inspect_err(|err| {
            warn!(%err, event_type = ?event.event_type, "event not recorded");
        })
    }
}
