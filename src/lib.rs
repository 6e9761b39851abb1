pub mod inference;

pub use inference::{
    display_reply, BackendOutcome, ChatClient, ChatError, ChatStream, EndpointConfig, Settings,
    DEFAULT_MODEL, NO_ENDPOINTS_MESSAGE,
};

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Log file name inside `CHATBRIDGE_LOG_DIR`.
const LOG_FILE_NAME: &str = "chatbridge.log";

/// Rotated generations kept when `CHATBRIDGE_LOG_KEEP` is unset.
const DEFAULT_LOG_KEEP: u32 = 3;

/// Initialize the tracing subscriber.
///
/// Logs go to stderr unless `CHATBRIDGE_LOG_DIR` is set, in which case they
/// are written to `chatbridge.log` in that directory. Earlier logs are
/// rotated to `chatbridge.log.1`, `.2`, ... and `CHATBRIDGE_LOG_KEEP`
/// generations are kept (default 3). `CHATBRIDGE_LOG_FORMAT=json` switches
/// to JSON lines. Safe to call twice; the second call is a no-op.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chatbridge=info,warn"));

    let (writer, log_path) = match open_log_file() {
        Some((file_writer, path)) => (BoxMakeWriter::new(file_writer), Some(path)),
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let json = std::env::var("CHATBRIDGE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    let installed = if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            log_file = ?log_path,
            pid = std::process::id(),
            "=== chatbridge starting ==="
        );
    }
}

/// Generations to keep, from `CHATBRIDGE_LOG_KEEP`.
fn log_keep() -> u32 {
    std::env::var("CHATBRIDGE_LOG_KEEP")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_LOG_KEEP)
}

/// Open `$CHATBRIDGE_LOG_DIR/chatbridge.log` after rotating older logs.
fn open_log_file() -> Option<(SharedLogFile, PathBuf)> {
    let dir = PathBuf::from(std::env::var_os("CHATBRIDGE_LOG_DIR")?);
    std::fs::create_dir_all(&dir).ok()?;

    let log_path = dir.join(LOG_FILE_NAME);
    rotate_logs(&log_path, log_keep());

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok()?;

    Some((SharedLogFile::new(file), log_path))
}

/// `chatbridge.log` with generation `n` is `chatbridge.log.n`.
fn rotated_path(current: &Path, generation: u32) -> PathBuf {
    let mut name = current.as_os_str().to_os_string();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Move the current log to generation 1, shifting older generations up.
///
/// Anything that would land past `keep` is deleted; `keep == 0` simply
/// removes the current log. Gaps in the chain are ignored.
fn rotate_logs(current: &Path, keep: u32) {
    if keep == 0 {
        let _ = std::fs::remove_file(current);
        return;
    }

    let _ = std::fs::remove_file(rotated_path(current, keep));
    for generation in (1..keep).rev() {
        let _ = std::fs::rename(
            rotated_path(current, generation),
            rotated_path(current, generation + 1),
        );
    }
    let _ = std::fs::rename(current, rotated_path(current, 1));
}

/// Log file handle shared by every subscriber writer.
///
/// Each write is flushed straight away so a CLI killed mid-request still
/// leaves its last line on disk.
#[derive(Clone)]
struct SharedLogFile {
    file: Arc<Mutex<File>>,
}

impl SharedLogFile {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }

    fn with_file<T>(&self, op: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        op(&mut *file)
    }
}

impl Write for SharedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| {
            let written = file.write(buf)?;
            file.flush()?;
            Ok(written)
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| file.flush())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogFile {
    type Writer = SharedLogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(dir: &Path, name: &str) -> String {
        std::fs::read_to_string(dir.join(name)).unwrap()
    }

    #[test]
    fn test_rotate_logs_shifts_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join(LOG_FILE_NAME);
        std::fs::write(&current, "current").unwrap();
        std::fs::write(dir.path().join("chatbridge.log.1"), "one").unwrap();
        std::fs::write(dir.path().join("chatbridge.log.3"), "three").unwrap();

        rotate_logs(&current, 3);

        assert!(!current.exists());
        assert_eq!(read(dir.path(), "chatbridge.log.1"), "current");
        assert_eq!(read(dir.path(), "chatbridge.log.2"), "one");
        assert!(!dir.path().join("chatbridge.log.3").exists());
    }

    #[test]
    fn test_rotate_logs_keep_one_and_zero() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join(LOG_FILE_NAME);
        std::fs::write(&current, "new").unwrap();
        std::fs::write(dir.path().join("chatbridge.log.1"), "old").unwrap();

        rotate_logs(&current, 1);
        assert_eq!(read(dir.path(), "chatbridge.log.1"), "new");
        assert!(!dir.path().join("chatbridge.log.2").exists());

        std::fs::write(&current, "again").unwrap();
        rotate_logs(&current, 0);
        assert!(!current.exists());
        assert_eq!(read(dir.path(), "chatbridge.log.1"), "new");
    }

    #[test]
    fn test_rotated_path() {
        let path = rotated_path(Path::new("/var/log/chatbridge.log"), 2);
        assert_eq!(path, PathBuf::from("/var/log/chatbridge.log.2"));
    }

    #[test]
    fn test_shared_log_file_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut writer = SharedLogFile::new(File::create(&path).unwrap());
        let mut other = writer.clone();

        writer.write_all(b"line one\n").unwrap();
        other.write_all(b"line two\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\nline two\n");
    }
}
