//! Append-only JSONL files, one per day.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::entry::DiagnosticEntry;

/// Appends diagnostics records to the current day's file.
///
/// The file is opened once at construction, so an app left running past
/// midnight keeps writing to the day it started on.
pub struct DiagnosticsWriter {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl DiagnosticsWriter {
    /// Open `dir/YYYY-MM-DD.jsonl`, creating the directory as needed.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = dir.join(format!("{date}.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush, so a crash loses at most the line
    /// being written.
    pub fn write(&self, entry: &DiagnosticEntry) -> io::Result<()> {
        let json = entry
            .to_json_line()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{json}")?;
        writer.flush()
    }

    pub fn flush(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }
}

impl Drop for DiagnosticsWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Records from one day's file, oldest first. Lines that do not parse
/// are skipped.
pub fn read_entries_for_date(
    dir: impl AsRef<Path>,
    date: &str,
) -> io::Result<Vec<DiagnosticEntry>> {
    let path = dir.as_ref().join(format!("{date}.jsonl"));
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(&path)?;
    Ok(parse_lines(&content))
}

/// The newest `limit` records across every file, oldest first.
pub fn recent_entries(dir: impl AsRef<Path>, limit: usize) -> io::Result<Vec<DiagnosticEntry>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    // date-named files, so lexicographic order is chronological
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();

    let mut collected: Vec<DiagnosticEntry> = Vec::new();
    for path in files.iter().rev() {
        let content = fs::read_to_string(path)?;
        let mut day = parse_lines(&content);
        day.append(&mut collected);
        collected = day;
        if collected.len() >= limit {
            break;
        }
    }

    if collected.len() > limit {
        collected.drain(..collected.len() - limit);
    }
    Ok(collected)
}

fn parse_lines(content: &str) -> Vec<DiagnosticEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| DiagnosticEntry::from_json_line(line).ok())
        .collect()
}
