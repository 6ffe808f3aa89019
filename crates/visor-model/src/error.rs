use visor_store::StoreError;

/// Errors from model persistence.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("duplicate primary key in {table}: {key}")]
    DuplicateKey { table: String, key: String },

    #[error("row for {table} is missing primary key column {column}")]
    MissingKeyColumn { table: String, column: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type ModelResult<T> = Result<T, ModelError>;
