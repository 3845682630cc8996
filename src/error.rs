use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("No manifest file could be read at \"{}\": {source}", .path.display())]
    ManifestMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("File in path \"{}\" does not contain valid json: {source}", .path.display())]
    ManifestMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid namespace mapping in \"{}\": {reason}", .path.display())]
    ManifestSchema { path: PathBuf, reason: String },
    #[error("No declared namespace prefix matches \"{0}\"")]
    NamespaceUnresolved(String),
    #[error("Expected a route group or action, {0} given")]
    InvalidRouteElement(String),
    #[error("Route action \"{pattern}\" declares no HTTP method")]
    EmptyMethods { pattern: String },
    #[error("Invalid path \"{}\"", .0.display())]
    InvalidPath(PathBuf),
    #[error("Configuration file \"{}\" not found", .0.display())]
    ConfigFile(PathBuf),
    #[error("Configuration file \"{}\" could not be parsed: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Missing configuration key \"{key}\"{}", in_section(.section))]
    MissingConfigKey {
        key: String,
        section: Option<String>,
    },
    #[error("Parameter \"%{0}%\" could not be resolved (circular reference?)")]
    UnresolvedParameter(String),
    #[error("Cache directory \"{}\" could not be created: {source}", .path.display())]
    CacheDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Command \"{0}\" is not defined")]
    UnknownCommand(String),
    #[error("Command \"{0}\" is already registered")]
    DuplicateCommand(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn in_section(section: &Option<String>) -> String {
    section
        .as_deref()
        .map(|s| format!(" in \"{s}\""))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, KernelError>;
