use std::path::PathBuf;

use thiserror::Error;

/// A game entry that could not be turned into a live instance.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("game '{id}' asks for unknown kind '{kind}'")]
    UnknownKind { id: String, kind: String },

    #[error("game '{id}' failed to construct: {source:#}")]
    Construct {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("game '{id}' panicked during construction: {message}")]
    Panicked { id: String, message: String },

    #[error("game '{0}' is not registered")]
    NotFound(String),
}

impl LoadError {
    /// Identifier (or manifest path) the error is about, for log fields.
    pub fn subject(&self) -> String {
        match self {
            LoadError::Io { path, .. } | LoadError::Manifest { path, .. } => path.display().to_string(),
            LoadError::UnknownKind { id, .. }
            | LoadError::Construct { id, .. }
            | LoadError::Panicked { id, .. }
            | LoadError::NotFound(id) => id.clone(),
        }
    }
}

/// What went wrong inside a contract method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    Error(String),
    Panic(String),
}

/// A contract method of the active game returned an error or panicked.
#[derive(Debug, Clone, Error)]
#[error("game '{game}' crashed in {op}: {kind:?}")]
pub struct GameFault {
    pub game: String,
    pub op: &'static str,
    pub kind: FaultKind,
}

/// Why a game could not become the active session.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("game '{0}' is not available")]
    NotFound(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    /// `start()` itself failed; the instance has been force-stopped.
    #[error(transparent)]
    Crashed(#[from] GameFault),
}

/// Conditions that stop the robot before the main loop runs.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("missing required setting {0} (set it in tirilo.toml or the environment)")]
    MissingCredentials(&'static str),

    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("terminal initialisation failed: {0}")]
    Terminal(#[from] std::io::Error),
}

/// Best-effort text from a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
