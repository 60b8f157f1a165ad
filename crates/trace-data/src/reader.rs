//! Log file discovery and incremental line reading.
//!
//! Files are never buffered whole: [`LineReader`] yields one line at a time so
//! memory stays bounded by what the parser keeps, not by file size.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use trace_core::error::{Result, TraceError};
use tracing::{debug, warn};

/// Extensions picked up when a directory is scanned.
pub const LOG_EXTENSIONS: &[&str] = &["log", "txt"];

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all log files recursively under `data_path`, sorted by path.
pub fn find_log_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        warn!("Data path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| LOG_EXTENSIONS.iter().any(|known| ext == *known))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Expand command-line inputs into the list of files to parse.
///
/// Directories are scanned with [`find_log_files`]; every other path is kept
/// as given (whatever its extension) so that a missing file surfaces as a
/// read error for that file instead of vanishing from the batch.
pub fn expand_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = find_log_files(input);
            debug!("{}: {} log files", input.display(), found.len());
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    files
}

/// Open `path` for incremental line reading.
pub fn open_lines(path: &Path) -> Result<LineReader<BufReader<File>>> {
    let file = File::open(path).map_err(|source| TraceError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(LineReader::new(BufReader::new(file)))
}

// ── LineReader ────────────────────────────────────────────────────────────────

/// Iterator over the lines of a byte stream.
///
/// Strips `\n` / `\r\n` terminators and replaces invalid UTF-8 instead of
/// failing, so a stray binary byte costs one line at most.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.inner.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
