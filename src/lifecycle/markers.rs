//! Pid and port marker files.
//!
//! # Responsibilities
//! - Publish `<pid>\n` to the pid file and `<port>\n` to `<pid>.port`
//!   (same directory) once the listener is bound
//! - Remove both files at termination, tolerating files already gone
//! - Let deployment tooling discover a running instance's port
//!
//! # Design Decisions
//! - Each write is scoped: create, write, sync, close on every path
//! - Removal is absence-tolerant; every other I/O failure is surfaced

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while writing or removing marker files.
#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("failed to write marker file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove marker file {path:?}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Identity published by a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerInfo {
    pub pid: u32,
    pub port: u16,
}

/// Path of the port file belonging to `pid`, next to `pid_file`.
pub fn port_file_path(pid_file: &Path, pid: u32) -> PathBuf {
    let name = format!("{pid}.port");
    match pid_file.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Marker files owned by this process.
#[derive(Debug)]
pub struct MarkerFiles {
    pid_file: PathBuf,
    /// Port file path, recorded once a write has been attempted.
    port_file: Option<PathBuf>,
}

impl MarkerFiles {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: pid_file.into(),
            port_file: None,
        }
    }

    /// Write the pid file, then the port file.
    ///
    /// Paths are recorded before writing, so [`MarkerFiles::cleanup`]
    /// also removes whatever a failed write left behind.
    pub fn write(&mut self, pid: u32, port: u16) -> Result<(), MarkerError> {
        let port_file = port_file_path(&self.pid_file, pid);
        self.port_file = Some(port_file.clone());

        write_marker(&self.pid_file, pid)?;
        write_marker(&port_file, port)?;

        tracing::debug!(
            pid_file = %self.pid_file.display(),
            port_file = %port_file.display(),
            "Marker files written"
        );
        Ok(())
    }

    /// Remove both marker files. Safe to call any number of times.
    ///
    /// Both removals are attempted; the first failure is returned.
    pub fn cleanup(&self) -> Result<(), MarkerError> {
        let Some(port_file) = &self.port_file else {
            return Ok(());
        };

        let pid_result = remove_if_exists(&self.pid_file);
        let port_result = remove_if_exists(port_file);

        pid_result?;
        port_result?;
        Ok(())
    }
}

fn write_marker(path: &Path, value: impl std::fmt::Display) -> Result<(), MarkerError> {
    let write = || -> io::Result<()> {
        let mut file = File::create(path)?;
        writeln!(file, "{value}")?;
        file.sync_all()
    };
    write().map_err(|source| MarkerError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_if_exists(path: &Path) -> Result<(), MarkerError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Marker file removed");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(MarkerError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_marker<T: std::str::FromStr>(content: &str) -> Option<T> {
    content.trim().parse().ok()
}

fn read_marker<T: std::str::FromStr>(path: &Path) -> Option<T> {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| parse_marker(&content))
}

/// Read the pid file and its sibling port file.
///
/// Returns `None` while either file is missing or unparsable.
pub fn discover(pid_file: &Path) -> Option<MarkerInfo> {
    let pid = read_marker(pid_file)?;
    let port = read_marker(&port_file_path(pid_file, pid))?;
    Some(MarkerInfo { pid, port })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_file_sits_next_to_pid_file() {
        assert_eq!(
            port_file_path(Path::new("/run/app/node.pid"), 42),
            Path::new("/run/app/42.port")
        );
        assert_eq!(port_file_path(Path::new("node.pid"), 42), Path::new("42.port"));
    }

    #[test]
    fn write_publishes_newline_terminated_values() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("node.pid");
        let mut markers = MarkerFiles::new(&pid_file);

        markers.write(1234, 54321).unwrap();

        assert_eq!(fs::read_to_string(&pid_file).unwrap(), "1234\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("1234.port")).unwrap(),
            "54321\n"
        );
        assert_eq!(
            discover(&pid_file),
            Some(MarkerInfo { pid: 1234, port: 54321 })
        );
    }

    #[test]
    fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("node.pid");
        let mut markers = MarkerFiles::new(&pid_file);
        markers.write(7, 8080).unwrap();

        markers.cleanup().unwrap();
        assert!(!pid_file.exists());
        assert!(!dir.path().join("7.port").exists());

        markers.cleanup().unwrap();
    }

    #[test]
    fn cleanup_before_write_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("node.pid");
        fs::write(&pid_file, "99\n").unwrap();

        MarkerFiles::new(&pid_file).cleanup().unwrap();
        assert!(pid_file.exists());
    }

    #[test]
    fn cleanup_removes_pid_file_whatever_it_contains() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("node.pid");
        let mut markers = MarkerFiles::new(&pid_file);
        markers.write(7, 8080).unwrap();

        fs::write(&pid_file, "8\n").unwrap();
        markers.cleanup().unwrap();

        assert!(!pid_file.exists());
        assert!(!dir.path().join("7.port").exists());
    }

    #[test]
    fn cleanup_surfaces_non_absence_failures() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("node.pid");
        let port_file = dir.path().join("7.port");
        let mut markers = MarkerFiles::new(&pid_file);
        markers.write(7, 8080).unwrap();

        fs::remove_file(&port_file).unwrap();
        fs::create_dir(&port_file).unwrap();

        let err = markers.cleanup().unwrap_err();
        assert!(matches!(err, MarkerError::Remove { ref path, .. } if path == &port_file));
        assert!(!pid_file.exists(), "pid file removal is still attempted");
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("missing").join("node.pid");
        let mut markers = MarkerFiles::new(&pid_file);

        let err = markers.write(7, 8080).unwrap_err();
        assert!(matches!(err, MarkerError::Write { ref path, .. } if path == &pid_file));
        markers.cleanup().unwrap();
    }

    #[test]
    fn discover_requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("node.pid");
        assert_eq!(discover(&pid_file), None);

        fs::write(&pid_file, "5\n").unwrap();
        assert_eq!(discover(&pid_file), None);

        fs::write(dir.path().join("5.port"), "not a port\n").unwrap();
        assert_eq!(discover(&pid_file), None);

        fs::write(dir.path().join("5.port"), "9000\n").unwrap();
        assert_eq!(discover(&pid_file), Some(MarkerInfo { pid: 5, port: 9000 }));
    }
}
