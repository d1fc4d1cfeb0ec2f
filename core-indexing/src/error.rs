use core_library::LibraryError;
use core_metadata::MetadataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("Folder already in collection: {0}")]
    FolderExists(String),

    #[error("Indexing cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for IndexingError {
    fn from(err: tokio::task::JoinError) -> Self {
        IndexingError::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexingError>;
