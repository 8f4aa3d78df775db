use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::Lines;
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::{info, warn};

use crate::error::PersistError;
use crate::snapshot::{Snapshot, SubjectSummary, TaskSummary};
use crate::state::StateName;

/// First line of every save file.
pub const VERSION_TAG: &str = "AcademicProgressTracker_SaveFile_v1";

/// Timestamp layout used by older save files.
const LEGACY_TIMESTAMP: &str = "%Y-%m-%d_%H-%M-%S";

/// RFC 3339 with a signed year, as written for instants after 9999.
const SIGNED_YEAR_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Returns the path to the default save file.
///
/// The path is determined in the following order:
/// 1. `APTRACK_SAVE` environment variable.
/// 2. `~/.local/share/aptrack/progress.save` (on Linux).
/// 3. `./progress.save` (fallback).
pub fn save_path() -> PathBuf {
    std::env::var("APTRACK_SAVE").map(PathBuf::from).unwrap_or_else(|_| {
        let mut p = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("aptrack");
        if !p.exists() {
            let _ = fs::create_dir_all(&p);
        }
        p.push("progress.save");
        p
    })
}

/// Ordered history of snapshots, oldest first.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    history: Vec<Snapshot>,
}

/// The process-wide store. Lock it for every access.
pub fn shared_store() -> &'static Mutex<SnapshotStore> {
    static STORE: OnceLock<Mutex<SnapshotStore>> = OnceLock::new();
    STORE.get_or_init(|| Mutex::new(SnapshotStore::new()))
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a snapshot. No deduplication is done.
    pub fn push(&mut self, snapshot: Snapshot) {
        self.history.push(snapshot);
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.history.get(index)
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.history.last()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.history.iter()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Renders the whole history in the save file format.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = write_history(&mut out, &self.history);
        out
    }

    /// Replaces the history with the one encoded in `text`.
    ///
    /// On failure the current history is left exactly as it was.
    pub fn decode(&mut self, text: &str) -> Result<(), PersistError> {
        let history = read_history(text)?;
        self.history = history;
        Ok(())
    }

    /// Writes the history to `path`, overwriting it.
    pub fn save_to(&self, path: &Path) -> Result<(), PersistError> {
        let s = self.encode();
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                warn!(path = %path.display(), "Failed to open save file: {}", e);
                e
            })?;
        f.write_all(s.as_bytes())?;
        info!(path = %path.display(), snapshots = self.history.len(), "History saved");
        Ok(())
    }

    /// Replaces the history with the one stored at `path`.
    ///
    /// On failure the current history is left exactly as it was.
    pub fn load_from(&mut self, path: &Path) -> Result<(), PersistError> {
        let mut f = OpenOptions::new().read(true).open(path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        match self.decode(&s) {
            Ok(()) => {
                info!(path = %path.display(), snapshots = self.history.len(), "History loaded");
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), "Failed to load save file: {}", e);
                Err(e)
            }
        }
    }

    /// Reads a store from `path`.
    pub fn open(path: &Path) -> Result<Self, PersistError> {
        let mut store = Self::new();
        store.load_from(path)?;
        Ok(store)
    }
}

fn write_history(out: &mut String, history: &[Snapshot]) -> std::fmt::Result {
    writeln!(out, "{VERSION_TAG}")?;
    writeln!(out, "{}", history.len())?;
    for snapshot in history {
        writeln!(
            out,
            "{}",
            snapshot
                .timestamp()
                .to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )?;
        writeln!(out, "{}", escape(snapshot.description()))?;

        writeln!(out, "{}", snapshot.subjects().len())?;
        for subject in snapshot.subjects() {
            writeln!(out, "{}", escape(&subject.name))?;
            writeln!(out, "{}", escape(&subject.code))?;
            writeln!(out, "{}", escape(&subject.description))?;
            writeln!(out, "{}", subject.task_titles.len())?;
            for title in &subject.task_titles {
                writeln!(out, "{}", escape(title))?;
            }
        }

        writeln!(out, "{}", snapshot.tasks().len())?;
        for task in snapshot.tasks() {
            writeln!(out, "{}", escape(&task.title))?;
            writeln!(out, "{}", escape(&task.description))?;
            writeln!(out, "{}", task.deadline.timestamp())?;
            writeln!(out, "{}", u8::from(task.completed))?;
            writeln!(out, "{}", task.marks)?;
            writeln!(out, "{}", task.progress)?;
            writeln!(out, "{}", task.state.as_str())?;
            writeln!(out, "{}", escape(task.subject_code.as_deref().unwrap_or("")))?;
        }
    }
    Ok(())
}

fn read_history(text: &str) -> Result<Vec<Snapshot>, PersistError> {
    // exact match, a trailing '\r' included
    let version = text.split('\n').next().unwrap_or("");
    if version != VERSION_TAG {
        return Err(PersistError::BadVersion(version.to_owned()));
    }
    let mut lines = LineReader::new(text);
    lines.raw()?;

    let count = lines.count()?;
    let mut history = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        history.push(read_snapshot(&mut lines)?);
    }
    lines.finish()?;
    Ok(history)
}

fn read_snapshot(lines: &mut LineReader<'_>) -> Result<Snapshot, PersistError> {
    let timestamp = lines.timestamp()?;
    let description = lines.text()?;

    let subject_count = lines.count()?;
    let mut subjects = Vec::with_capacity(subject_count.min(1024));
    for _ in 0..subject_count {
        let name = lines.required_text("subject name")?;
        let code = lines.required_text("subject code")?;
        let description = lines.text()?;
        let title_count = lines.count()?;
        let task_titles = (0..title_count)
            .map(|_| lines.text())
            .collect::<Result<Vec<_>, _>>()?;
        subjects.push(SubjectSummary {
            name,
            code,
            description,
            task_titles,
        });
    }

    let task_count = lines.count()?;
    let mut tasks = Vec::with_capacity(task_count.min(1024));
    for _ in 0..task_count {
        tasks.push(read_task(lines)?);
    }
    Ok(Snapshot::from_parts(timestamp, description, subjects, tasks))
}

fn read_task(lines: &mut LineReader<'_>) -> Result<TaskSummary, PersistError> {
    let title = lines.required_text("task title")?;
    let description = lines.text()?;
    let deadline = lines.epoch_seconds()?;
    let completed = lines.flag()?;
    let marks = lines.parse::<i32>("marks")?;
    let progress = lines.parse::<f32>("progress")?;
    let state = lines.state()?;
    let state_line = lines.line;
    let subject_code = lines.text()?;

    if completed != (state == StateName::Completed) {
        return Err(PersistError::Malformed {
            line: state_line,
            reason: format!("completed flag disagrees with state '{state}'"),
        });
    }
    Ok(TaskSummary {
        title,
        description,
        deadline,
        completed,
        marks,
        progress,
        state,
        subject_code: (!subject_code.is_empty()).then_some(subject_code),
    })
}

/// Cursor over the lines of a save file that tracks line numbers for errors.
struct LineReader<'a> {
    lines: Lines<'a>,
    line: usize,
}

impl<'a> LineReader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            line: 0,
        }
    }

    fn raw(&mut self) -> Result<&'a str, PersistError> {
        self.line += 1;
        self.lines
            .next()
            .ok_or(PersistError::UnexpectedEof { line: self.line })
    }

    fn malformed(&self, reason: impl Into<String>) -> PersistError {
        PersistError::Malformed {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn text(&mut self) -> Result<String, PersistError> {
        let raw = self.raw()?;
        unescape(raw).ok_or_else(|| self.malformed("invalid escape sequence"))
    }

    fn required_text(&mut self, what: &str) -> Result<String, PersistError> {
        let value = self.text()?;
        if value.trim().is_empty() {
            return Err(self.malformed(format!("{what} must not be empty")));
        }
        Ok(value)
    }

    fn parse<T: std::str::FromStr>(&mut self, what: &str) -> Result<T, PersistError> {
        let raw = self.raw()?;
        raw.trim()
            .parse()
            .map_err(|_| self.malformed(format!("invalid {what} '{raw}'")))
    }

    fn count(&mut self) -> Result<usize, PersistError> {
        self.parse("count")
    }

    fn flag(&mut self) -> Result<bool, PersistError> {
        match self.raw()?.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(self.malformed(format!("invalid completed flag '{other}'"))),
        }
    }

    fn epoch_seconds(&mut self) -> Result<DateTime<Utc>, PersistError> {
        let secs = self.parse::<i64>("deadline")?;
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| self.malformed(format!("deadline {secs} out of range")))
    }

    fn timestamp(&mut self) -> Result<DateTime<Utc>, PersistError> {
        let raw = self.raw()?.trim();
        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            return Ok(t.with_timezone(&Utc));
        }
        [SIGNED_YEAR_TIMESTAMP, LEGACY_TIMESTAMP]
            .into_iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
            .map(|t| t.and_utc())
            .ok_or_else(|| self.malformed(format!("invalid timestamp '{raw}'")))
    }

    fn state(&mut self) -> Result<StateName, PersistError> {
        let raw = self.raw()?;
        StateName::try_from(raw).map_err(|source| PersistError::UnknownState {
            line: self.line,
            source,
        })
    }

    /// Fails if anything but blank lines remain.
    fn finish(&mut self) -> Result<(), PersistError> {
        while let Some(rest) = self.lines.next() {
            self.line += 1;
            if !rest.trim().is_empty() {
                return Err(self.malformed("unexpected trailing data"));
            }
        }
        Ok(())
    }
}

/// Escapes backslashes and line breaks so a field stays on one line.
pub fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Reverses [`escape`]. Returns `None` on an unknown or dangling escape.
pub fn unescape(field: &str) -> Option<String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}
