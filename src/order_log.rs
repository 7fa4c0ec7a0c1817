use {
    chrono::{DateTime, Local},
    std::{
        borrow::Cow,
        collections::BTreeMap,
        fmt,
        fs::{self, OpenOptions},
        io::{self, Write as _},
        path::{Path, PathBuf},
        sync::{Mutex, PoisonError},
    },
};

/// Raw request parameters, as decoded from a query string or form body.
pub type Params = BTreeMap<String, String>;

/// One line of the order log.
pub struct LogRecord<'a> {
    pub timestamp: DateTime<Local>,
    pub product_id: &'a str,
    pub email: &'a str,
    pub query: &'a Params,
    pub form: &'a Params,
}

impl fmt::Display for LogRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query = serde_json::to_string(self.query).map_err(|_| fmt::Error)?;
        let form = serde_json::to_string(self.form).map_err(|_| fmt::Error)?;

        write!(
            f,
            "{} | PID: {} | Email: {} | GET: {} | POST: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            single_line(self.product_id),
            single_line(self.email),
            query,
            form,
        )
    }
}

// Client-supplied text must not be able to start a record of its own.
fn single_line(text: &str) -> Cow<'_, str> {
    if text.contains(|c: char| c == '\r' || c == '\n') {
        Cow::Owned(text.replace('\r', "\\r").replace('\n', "\\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Append-only sink for order records.
///
/// Appending never fails from the caller's point of view: sinks swallow
/// their own errors.
pub trait OrderLog: Send + Sync {
    fn append(&self, record: &LogRecord<'_>);
}

pub struct NullOrderLog;

impl OrderLog for NullOrderLog {
    fn append(&self, _record: &LogRecord<'_>) {}
}

/// Appends records to a file, one line each.
///
/// The file is reopened for every record so it can be rotated or removed
/// underneath a running server.
pub struct FileOrderLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileOrderLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(error) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), %error, "unable to create order log directory");
            }
        }

        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        file.write_all(line.as_bytes())
    }
}

impl OrderLog for FileOrderLog {
    fn append(&self, record: &LogRecord<'_>) {
        let line = format!("{}\n", record);

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(error) = self.write_line(&line) {
            tracing::warn!(path = %self.path.display(), %error, "unable to append to order log");
        }
    }
}
