//! Append-only session logs.
//!
//! One textual record per line in `<output_dir>/<label>.dat`. Files are only
//! ever opened in append mode, so earlier sessions under the same label are
//! kept.

use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crossbeam_channel::Receiver;

/// Extension of session log files.
pub const SESSION_EXTENSION: &str = "dat";

/// `<output_dir>/<label>.dat`
pub fn session_path(output_dir: &Path, label: &str) -> PathBuf {
    output_dir.join(format!("{label}.{SESSION_EXTENSION}"))
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Append `record` and a newline to `path`, creating parent directories.
pub fn append(path: &Path, record: &impl Display) -> io::Result<()> {
    let mut file = open_append(path)?;
    file.write_all(format!("{record}\n").as_bytes())
}

/// Single writer for one log file. Concurrent appends are serialised so
/// lines never interleave.
#[derive(Debug)]
pub struct RecordLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RecordLog {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        tracing::debug!(path = %path.display(), "session log opened");
        Ok(RecordLog {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &impl Display) -> io::Result<()> {
        let line = format!("{record}\n");
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(line.as_bytes())
    }

    pub fn flush(&self) -> io::Result<()> {
        self.file.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }
}

/// Write every record currently queued to `<output_dir>/<label>.dat`.
///
/// Does not wait for producers; returns the number of records written.
pub fn drain_queue_to_file<T: Display>(
    queue: &Receiver<T>,
    output_dir: &Path,
    label: &str,
) -> io::Result<usize> {
    let log = RecordLog::open(session_path(output_dir, label))?;
    let mut written = 0;
    for record in queue.try_iter() {
        log.append(&record)?;
        written += 1;
    }
    log.flush()?;
    tracing::info!(path = %log.path().display(), written, "queue drained to file");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn append_creates_dirs_and_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.dat");
        append(&path, &"first").unwrap();
        append(&path, &42).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\n42\n");
    }

    #[test]
    fn session_path_uses_dat_extension() {
        assert_eq!(
            session_path(Path::new("output"), "p1_glove"),
            PathBuf::from("output/p1_glove.dat")
        );
    }

    #[test]
    fn drain_writes_queued_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..5 {
            tx.send(format!("record-{i}")).unwrap();
        }
        let n = drain_queue_to_file(&rx, dir.path(), "imu").unwrap();
        assert_eq!(n, 5);
        assert!(rx.is_empty());

        tx.send("record-5".to_string()).unwrap();
        drain_queue_to_file(&rx, dir.path(), "imu").unwrap();

        let text = fs::read_to_string(dir.path().join("imu.dat")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "record-0");
        assert_eq!(lines[5], "record-5");
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(RecordLog::open(dir.path().join("shared.dat")).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|w| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..100 {
                        log.append(&format!("writer{w}-{i:03}-{}", "x".repeat(64)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        log.flush().unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().count(), 400);
        assert!(text
            .lines()
            .all(|l| l.starts_with("writer") && l.ends_with(&"x".repeat(64))));
    }
}
