//! The top-level error taxonomy, per §7. Every other crate's errors fold
//! into one of these kinds at the orchestrator boundary, where the CLI
//! binaries pick an exit code from it.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] gpbackup_catalog::CatalogError),

    #[error("transport error: {0}")]
    Transport(#[from] gpbackup_plugin::Error),

    #[error("helper protocol error: {0}")]
    HelperProtocol(String),

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("aborted by signal")]
    Aborted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] gpbackup_archive::ArchiveError),
}

impl From<gpbackup_ddl::EmitError> for Error {
    fn from(e: gpbackup_ddl::EmitError) -> Self {
        match e {
            gpbackup_ddl::EmitError::Io(e) => Error::Io(e),
            gpbackup_ddl::EmitError::Archive(e) => Error::Archive(e),
        }
    }
}

impl From<gpbackup_mover::MoverError> for Error {
    fn from(e: gpbackup_mover::MoverError) -> Self {
        match e {
            gpbackup_mover::MoverError::HelperProtocol(msg) => Error::HelperProtocol(msg),
            gpbackup_mover::MoverError::Timeout { relation_oid } => {
                Error::HelperProtocol(format!("table {relation_oid} timed out"))
            }
            gpbackup_mover::MoverError::Io(e) => Error::Io(e),
            gpbackup_mover::MoverError::Transport(e) => Error::Transport(e),
            gpbackup_mover::MoverError::Nix(e) => {
                Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
            }
        }
    }
}

impl Error {
    /// Whether this error kind may be retried once before it is treated as
    /// fatal, per §7's propagation rule: "retryable (Transport, single
    /// transient HelperProtocol) with at most one retry."
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::HelperProtocol(_))
    }

    /// The process exit code this error maps to, per §6: 0 success, 1
    /// fatal error, 2 aborted by signal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Aborted => 2,
            _ => 1,
        }
    }
}
