#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("toc entry out of order: {0}")]
    TocOutOfOrder(String),

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
