#[derive(Debug, thiserror::Error)]
pub enum MoverError {
    #[error("illegal pipe transition: {from:?} -> {event:?}")]
    IllegalTransition { from: crate::pipe::State, event: crate::pipe::Event },

    #[error("helper protocol error: {0}")]
    HelperProtocol(String),

    #[error("table {relation_oid} timed out waiting for progress")]
    Timeout { relation_oid: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] gpbackup_plugin::Error),

    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
}

pub type Result<T> = std::result::Result<T, MoverError>;
