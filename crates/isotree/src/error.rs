use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The orchestrator was driven out of order (e.g. `run` before `configure`).
    Contract,
    /// The environment cannot host a build (privileges, tools, engine handle).
    Precondition,
    /// A package engine or builder failed while doing its work.
    Collaborator,
    Config,
    Io,
    Other,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Contract => "contract",
            ErrorKind::Precondition => "precondition",
            ErrorKind::Collaborator => "collaborator",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Other => "other",
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Other, msg)
    }

    pub fn new<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn contract<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Contract, msg)
    }

    pub fn precondition<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Precondition, msg)
    }

    pub fn collaborator<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Collaborator, msg)
    }

    pub fn config<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Prefix the message with a stage id. Errors raised by collaborators
    /// without a more specific kind are reclassified as collaborator failures.
    pub fn in_stage(self, stage: &str, collaborator: bool) -> Self {
        let kind = match self.kind {
            ErrorKind::Other | ErrorKind::Io if collaborator => ErrorKind::Collaborator,
            k => k,
        };
        Self {
            kind,
            msg: format!("stage '{stage}' failed: {}", self.msg),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
