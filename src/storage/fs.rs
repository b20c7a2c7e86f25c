// src/storage/fs.rs

//! Filesystem backends.
//!
//! Layout under the configured root:
//!
//! - `<root>/artifacts/<key>`: one file per artifact
//! - `<root>/ledger.jsonl`: one JSON-encoded `Dataset` per line

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{ArtifactStore, RecordIter, RecordStore};
use crate::database::{Dataset, Predicate};
use crate::errors::{EngineError, Result};

pub const ARTIFACT_DIR: &str = "artifacts";
pub const LEDGER_FILE: &str = "ledger.jsonl";

/// Make a directory's entries (new files, links) durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Artifacts stored as individual files.
///
/// Writes go to a temporary file that is fsynced and then hard-linked into
/// place; linking fails if the key already exists, so the first writer wins.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let dir = root.as_ref().join(ARTIFACT_DIR);
        fs::create_dir_all(&dir)
            .and_then(|_| sync_dir(root.as_ref()))
            .map_err(|e| EngineError::storage(format!("creating artifact dir {dir:?}"), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(EngineError::storage(
                format!("resolving artifact key {key:?}"),
                io::Error::new(io::ErrorKind::InvalidInput, "invalid artifact key"),
            ));
        }
        Ok(self.dir.join(key))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<bool> {
        let path = self.path_for(key)?;
        if path.exists() {
            return Ok(false);
        }

        let tmp = self
            .dir
            .join(format!(".{key}.{}.tmp", uuid::Uuid::now_v7().simple()));
        let write_tmp = || -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp);
            return Err(EngineError::storage(format!("writing artifact {key}"), e));
        }

        let linked = fs::hard_link(&tmp, &path);
        if let Err(e) = fs::remove_file(&tmp) {
            warn!(path = ?tmp, error = %e, "failed to remove temporary artifact file");
        }

        match linked {
            Ok(()) => {
                sync_dir(&self.dir)
                    .map_err(|e| EngineError::storage(format!("syncing artifact dir for {key}"), e))?;
                debug!(key, bytes = bytes.len(), "stored artifact (file)");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(EngineError::storage(format!("publishing artifact {key}"), e)),
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::storage(format!("reading artifact {key}"), e)),
        }
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| EngineError::storage(format!("listing {:?}", self.dir), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::storage("listing artifacts", e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                keys.push(name);
            }
        }
        Ok(keys)
    }
}

/// Ledger stored as JSON lines, fsynced after every append.
///
/// A crash mid-append can leave an unterminated last line. Opening the store
/// truncates such a tail, and scans ignore one that appears later.
#[derive(Debug)]
pub struct FsRecordStore {
    path: PathBuf,
    /// Serialises appends from this process.
    write_lock: Mutex<()>,
}

impl FsRecordStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let path = root.join(LEDGER_FILE);
        fs::create_dir_all(root)
            .and_then(|_| {
                OpenOptions::new().create(true).append(true).open(&path)?;
                sync_dir(root)
            })
            .map_err(|e| EngineError::storage(format!("creating ledger {path:?}"), e))?;
        repair_tail(&path)
            .map_err(|e| EngineError::storage(format!("repairing ledger {path:?}"), e))?;
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for FsRecordStore {
    fn append(&self, record: &Dataset) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::storage(format!("opening ledger {:?}", self.path), e))?;
        let len = file
            .metadata()
            .map_err(|e| EngineError::storage("reading ledger length", e))?
            .len();
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.sync_data()) {
            // Drop the partial line so the next append starts clean.
            if let Err(undo) = file.set_len(len) {
                warn!(path = ?self.path, error = %undo, "failed to roll back partial ledger append");
            }
            return Err(EngineError::storage("appending ledger record", e));
        }
        Ok(())
    }

    fn scan(&self, predicate: Option<&Predicate>) -> Result<RecordIter> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Box::new(std::iter::empty())),
            Err(e) => {
                return Err(EngineError::storage(
                    format!("opening ledger {:?}", self.path),
                    e,
                ));
            }
        };

        let predicate = predicate.cloned();
        let records = LedgerLines {
            reader: BufReader::new(file),
            path: self.path.clone(),
        }
        .filter(move |record| match (record, &predicate) {
            (Ok(r), Some(p)) => p.matches(r),
            _ => true,
        });
        Ok(Box::new(records))
    }
}

/// Parsed ledger rows. An unparsable final line without a newline is an
/// append still in flight (or torn by a crash) and ends the scan.
struct LedgerLines {
    reader: BufReader<File>,
    path: PathBuf,
}

impl Iterator for LedgerLines {
    type Item = Result<Dataset>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut buf = Vec::new();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(EngineError::storage("reading ledger", e))),
            }
            let terminated = buf.last() == Some(&b'\n');
            let text = String::from_utf8_lossy(&buf);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            return match serde_json::from_str::<Dataset>(text) {
                Ok(record) => Some(Ok(record)),
                Err(e) if !terminated => {
                    warn!(path = ?self.path, error = %e, "ignoring incomplete trailing ledger record");
                    None
                }
                Err(e) => Some(Err(e.into())),
            };
        }
    }
}

/// Truncate an unterminated last line that does not parse, or terminate
/// one that does.
fn repair_tail(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut contents = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut contents)?;
    let keep = contents
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);
    let tail = &contents[keep..];

    if serde_json::from_slice::<Dataset>(tail).is_ok() {
        file.seek(SeekFrom::End(0))?;
        file.write_all(b"\n")?;
    } else {
        warn!(
            path = ?path,
            dropped_bytes = tail.len(),
            "truncating incomplete trailing ledger record"
        );
        file.set_len(keep as u64)?;
    }
    file.sync_data()
}
