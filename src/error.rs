use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrafixError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Toolchain '{toolchain}' is not available at {}", .home.display())]
    ToolchainUnavailable { toolchain: String, home: PathBuf },

    #[error("Failed to start {operation}: {source}")]
    CommandSpawn {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} failed with {}", exit_description(.code))]
    CommandFailed { operation: String, code: Option<i32> },

    #[error("No test reports found at {}. Did the tests run?", .0.display())]
    ReportMissing(PathBuf),

    #[error("Malformed test report {}: {source}", .path.display())]
    MalformedReport {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },

    #[error("Invalid repository URL: {0}")]
    InvalidRepository(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, MigrafixError>;
