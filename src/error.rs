use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum VigilError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("failed to write {path}")]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("wizard cancelled")]
    InitCancelled,

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("installation failed at '{step}' after {attempts} attempts")]
    InstallFailed { step: String, attempts: u32 },

    #[error("engine invariant violated: {message}")]
    Engine { message: String },
}

impl From<crate::engine::state::StateError> for VigilError {
    fn from(e: crate::engine::state::StateError) -> Self {
        VigilError::Engine {
            message: e.to_string(),
        }
    }
}
