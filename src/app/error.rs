use std::io;
use std::process::ExitCode;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("enter a search query")]
    EmptyQuery,

    #[error("unknown region {0:?} (use --list-regions to see the supported ones)")]
    UnknownRegion(String),

    #[error("invalid proxy {proxy}: {source}")]
    InvalidProxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid records in {path}: {source}")]
    Records {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("spreadsheet encoding failed: {0}")]
    Spreadsheet(#[from] zip::result::ZipError),

    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Write(#[from] io::Error),
}

impl AppError {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    /// Validation failures are the submitter's to fix; everything else is ours.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::EmptyQuery | AppError::UnknownRegion(_))
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_validation() {
            ExitCode::from(2)
        } else {
            ExitCode::FAILURE
        }
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
