use std::path::PathBuf;

use market_core::{ErrorCode, SourceError};
use thiserror::Error;

/// Failure reading or writing snapshot files. Always fatal to the run.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("{} not found. Run fetch first.", .0.display())]
    Missing(PathBuf),

    #[error("failed to create {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("raw snapshot missing: {0}")]
    RawSnapshotMissing(PathBuf),

    #[error(transparent)]
    Artifact(ArtifactError),

    #[error("session setup failed: {0}")]
    Session(#[from] SourceError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<ArtifactError> for SnapshotError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::Missing(path) => SnapshotError::RawSnapshotMissing(path),
            other => SnapshotError::Artifact(other),
        }
    }
}

impl SnapshotError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            SnapshotError::RawSnapshotMissing(_) => Some(ErrorCode::DataFileRead),
            SnapshotError::Artifact(ArtifactError::Read { .. } | ArtifactError::Parse { .. }) => {
                Some(ErrorCode::DataFileRead)
            }
            _ => None,
        }
    }
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_raw_maps_to_e002() {
        let err: SnapshotError = ArtifactError::Missing(PathBuf::from("data/data_raw.json")).into();
        assert!(matches!(err, SnapshotError::RawSnapshotMissing(_)));
        assert_eq!(err.code(), Some(ErrorCode::DataFileRead));
    }
}
