//! Append-only CSV file sink.
//!
//! The primary, always-available copy of every registration. Each append
//! encodes one complete row into a buffer and issues a single write on a
//! handle opened in append mode, so concurrent writers cannot overwrite or
//! split each other's lines. Reads reopen the file from the start every time.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use starlinx_core::error::{Result, StarlinxError};
use starlinx_core::types::{Registration, CSV_HEADERS};

/// Full contents of the CSV file: header row plus data rows in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CsvDump {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvDump {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// CSV file sink.
pub struct FileSink {
    path: PathBuf,
    /// Serializes appends within this process. Across processes the
    /// append-mode single write keeps lines intact.
    write_lock: Mutex<()>,
}

impl FileSink {
    /// Open the sink, creating the parent directory and header if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let sink = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };
        if let Some(parent) = sink.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        {
            let _guard = sink.lock()?;
            sink.ensure_header()?;
        }
        info!(path = %sink.path.display(), "CSV sink ready");
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one registration as a single CSV line.
    pub fn append(&self, registration: &Registration) -> Result<()> {
        let line = encode_row(&registration.csv_fields())?;

        let _guard = self.lock()?;
        // The file may have been rotated away since startup.
        self.ensure_header()
            .map_err(|e| StarlinxError::PrimarySink(e.to_string()))?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| primary(&self.path, e))?;
        file.write_all(&line).map_err(|e| primary(&self.path, e))?;
        file.flush().map_err(|e| primary(&self.path, e))?;

        debug!(path = %self.path.display(), bytes = line.len(), "CSV row appended");
        Ok(())
    }

    /// Read the header and every data row from disk.
    ///
    /// A missing file reads as the canonical header with no rows.
    pub fn dump(&self) -> Result<CsvDump> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(CsvDump {
                    headers: canonical_headers(),
                    rows: Vec::new(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(CsvDump { headers, rows })
    }

    /// Raw file bytes, exactly as stored.
    ///
    /// A missing file reads as just the header line.
    pub fn read_raw(&self) -> Result<Vec<u8>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => encode_row(&canonical_headers()),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of data rows (lines after the header).
    pub fn row_count(&self) -> Result<u64> {
        Ok(self.dump()?.len() as u64)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| StarlinxError::PrimarySink(format!("CSV sink lock poisoned: {}", e)))
    }

    /// Write the header line if the file is absent or empty.
    ///
    /// Caller must hold `write_lock`.
    fn ensure_header(&self) -> Result<()> {
        let needs_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        if needs_header {
            let header = encode_row(&canonical_headers())?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(&header)?;
            debug!(path = %self.path.display(), "CSV header written");
        }
        Ok(())
    }
}

fn canonical_headers() -> Vec<String> {
    CSV_HEADERS.iter().map(|h| h.to_string()).collect()
}

/// Encode one record as a complete, newline-terminated CSV line.
fn encode_row<I, T>(fields: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| StarlinxError::Csv(e.to_string()))
}

fn primary(path: &Path, err: std::io::Error) -> StarlinxError {
    StarlinxError::PrimarySink(format!("{}: {}", path.display(), err))
}
