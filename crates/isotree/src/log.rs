//! Per-run logging context.
//!
//! A [`BuildLog`] is created by the caller for one run and handed to the
//! orchestrator and every collaborator. Events go to a [`BuildSink`]
//! (console via `tracing`, a channel for a UI, or memory for tests) and,
//! once a log directory exists, to a plain-text file under it.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};

use crate::error::{Error, Result};
use crate::log_sanitize::{OutputFilter, sanitize_line};

pub const LOG_FILE_NAME: &str = "isotree.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Critical,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    StageStarted {
        id: &'static str,
    },
    StageFinished {
        id: &'static str,
        ok: bool,
        error: Option<String>,
        elapsed_ms: u128,
    },
    Log {
        level: Level,
        message: String,
    },
    RunDone {
        ok: bool,
        error: Option<String>,
    },
}

pub trait BuildSink: Send + Sync {
    fn emit(&self, ev: &BuildEvent);
}

/// Forwards events to the process-wide `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl BuildSink for TracingSink {
    fn emit(&self, ev: &BuildEvent) {
        match ev {
            BuildEvent::StageStarted { id } => tracing::debug!(stage = *id, "stage started"),
            BuildEvent::StageFinished {
                id,
                ok,
                error,
                elapsed_ms,
            } => {
                let elapsed_ms = u64::try_from(*elapsed_ms).unwrap_or(u64::MAX);
                if *ok {
                    tracing::debug!(stage = *id, elapsed_ms, "stage done");
                } else {
                    let error = error.as_deref().unwrap_or_default();
                    tracing::debug!(stage = *id, elapsed_ms, error, "stage failed");
                }
            }
            BuildEvent::Log { level, message } => match level {
                Level::Debug => tracing::debug!("{message}"),
                Level::Info => tracing::info!("{message}"),
                Level::Warning => tracing::warn!("{message}"),
                Level::Critical => tracing::error!("{message}"),
            },
            BuildEvent::RunDone { ok: true, .. } => tracing::info!("build finished"),
            BuildEvent::RunDone { error, .. } => {
                tracing::error!("build failed: {}", error.as_deref().unwrap_or_default())
            }
        }
    }
}

#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<BuildEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<BuildEvent>) -> Self {
        Self { tx }
    }
}

impl BuildSink for ChannelSink {
    fn emit(&self, ev: &BuildEvent) {
        let _ = self.tx.send(ev.clone());
    }
}

/// Keeps every event; used by tests and by callers that want a post-run report.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<BuildEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn count(&self, level: Level) -> usize {
        self.events()
            .iter()
            .filter(|ev| matches!(ev, BuildEvent::Log { level: l, .. } if *l == level))
            .count()
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|ev| match ev {
                BuildEvent::Log { level: l, message } if l == level => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn stages(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .filter_map(|ev| match ev {
                BuildEvent::StageStarted { id } => Some(*id),
                _ => None,
            })
            .collect()
    }
}

impl BuildSink for MemorySink {
    fn emit(&self, ev: &BuildEvent) {
        if let Ok(mut g) = self.events.lock() {
            g.push(ev.clone());
        }
    }
}

impl<T: BuildSink + ?Sized> BuildSink for Arc<T> {
    fn emit(&self, ev: &BuildEvent) {
        (**self).emit(ev)
    }
}

struct LogFile {
    path: PathBuf,
    file: File,
}

pub struct BuildLog {
    sink: Box<dyn BuildSink>,
    file: Mutex<Option<LogFile>>,
    filter: Mutex<OutputFilter>,
}

impl BuildLog {
    pub fn new(sink: impl BuildSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            file: Mutex::new(None),
            filter: Mutex::new(OutputFilter::default()),
        }
    }

    pub fn tracing() -> Self {
        Self::new(TracingSink)
    }

    pub fn set_filter(&self, filter: OutputFilter) {
        if let Ok(mut g) = self.filter.lock() {
            *g = filter;
        }
    }

    /// Open `<dir>/isotree.log` (truncating) and copy every later event into it.
    /// A second call for the same run keeps the first file.
    pub fn attach_file(&self, dir: &Path) -> Result<PathBuf> {
        let mut g = self
            .file
            .lock()
            .map_err(|_| Error::msg("log file lock poisoned"))?;
        if let Some(existing) = g.as_ref() {
            return Ok(existing.path.clone());
        }
        fs::create_dir_all(dir)
            .map_err(|e| Error::msg(format!("failed to create log dir {}: {e}", dir.display())))?;
        let path = dir.join(LOG_FILE_NAME);
        let file = File::create(&path)
            .map_err(|e| Error::msg(format!("failed to open log file {}: {e}", path.display())))?;
        *g = Some(LogFile {
            path: path.clone(),
            file,
        });
        Ok(path)
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.file
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|f| f.path.clone()))
    }

    pub fn emit(&self, ev: BuildEvent) {
        self.sink.emit(&ev);
        self.write_file_line(&render_file_line(&ev));
    }

    pub fn log(&self, level: Level, message: impl Into<String>) {
        self.emit(BuildEvent::Log {
            level,
            message: message.into(),
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Level::Warning, message)
    }

    pub fn critical(&self, message: impl Into<String>) {
        self.log(Level::Critical, message)
    }

    /// One line of subprocess output: sanitized, dropped if it matches the
    /// ignore list, otherwise logged at debug level.
    pub fn command_output(&self, raw: &str) {
        let line = sanitize_line(raw);
        if line.trim().is_empty() {
            return;
        }
        let ignored = self
            .filter
            .lock()
            .map(|f| f.ignores(&line))
            .unwrap_or(false);
        if !ignored {
            self.debug(line);
        }
    }

    fn write_file_line(&self, line: &str) {
        let Ok(mut g) = self.file.lock() else {
            return;
        };
        if let Some(f) = g.as_mut() {
            let _ = writeln!(f.file, "{line}");
        }
    }
}

fn render_file_line(ev: &BuildEvent) -> String {
    let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    match ev {
        BuildEvent::Log { level, message } => format!("{ts} {:<8} {message}", level.as_str()),
        BuildEvent::StageStarted { id } => format!("{ts} {:<8} >> {id}", "STAGE"),
        BuildEvent::StageFinished {
            id,
            ok,
            error,
            elapsed_ms,
        } => if *ok {
            format!("{ts} {:<8} << {id} ({elapsed_ms}ms)", "STAGE")
        } else {
            format!(
                "{ts} {:<8} << {id} FAILED ({elapsed_ms}ms) {}",
                "STAGE",
                error.as_deref().unwrap_or_default()
            )
        },
        BuildEvent::RunDone { ok, error } => if *ok {
            format!("{ts} {:<8} done: ok", "RUN")
        } else {
            format!(
                "{ts} {:<8} done: failed {}",
                "RUN",
                error.as_deref().unwrap_or_default()
            )
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_receives_events_after_attach_only() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let sink = Arc::new(MemorySink::default());
        let log = BuildLog::new(Arc::clone(&sink));

        log.info("before attach");
        let path = log.attach_file(&tmp.path().join("log")).expect("attach");
        log.warning("after attach");

        let body = fs::read_to_string(&path).expect("read log");
        assert!(!body.contains("before attach"));
        assert!(body.contains("WARNING  after attach"), "body: {body}");
        assert_eq!(sink.count(Level::Info), 1);
        assert_eq!(sink.count(Level::Warning), 1);
    }

    #[test]
    fn channel_sink_forwards_events() {
        let (tx, rx) = mpsc::channel();
        let log = BuildLog::new(ChannelSink::new(tx));
        log.emit(BuildEvent::StageStarted { id: "arch.resolve" });
        log.critical("boom");

        let got: Vec<BuildEvent> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                BuildEvent::StageStarted { id: "arch.resolve" },
                BuildEvent::Log {
                    level: Level::Critical,
                    message: "boom".into(),
                },
            ]
        );
    }

    #[test]
    fn attach_twice_keeps_first_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let log = BuildLog::new(MemorySink::default());
        let a = log.attach_file(&tmp.path().join("a")).expect("attach a");
        let b = log.attach_file(&tmp.path().join("b")).expect("attach b");
        assert_eq!(a, b);
        assert_eq!(log.file_path(), Some(a));
    }

    #[test]
    fn command_output_is_sanitized_and_filtered() {
        let sink = Arc::new(MemorySink::default());
        let log = BuildLog::new(Arc::clone(&sink));
        log.set_filter(OutputFilter::new(["^warning: .*scriptlet"]).expect("filter"));

        log.command_output("\u{1b}[1mInstalling\u{1b}[0m: kernel");
        log.command_output("warning: %post scriptlet failed");
        log.command_output("   ");

        assert_eq!(sink.messages(Level::Debug), vec!["Installing: kernel".to_string()]);
    }
}
