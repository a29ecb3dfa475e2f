/// CatalogError is the error taxonomy for the probe, corresponding to the
/// `Catalog` kind of spec §7.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("database did not provide a shareable snapshot: {0}")]
    SnapshotUnavailable(String),
    #[error("catalog query failed")]
    Query(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
