use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("store is not open")]
    NotOpen,

    #[error("field '{field}' is {len} bytes, limit is {limit}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        limit: usize,
    },

    #[error("bucket count must be at least 1")]
    InvalidBucketCount,

    #[error("corrupt store: {0}")]
    Corrupt(String),
}
