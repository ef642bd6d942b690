use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error("cache base path exists but is not a writable directory")]
    CacheNotWritableDirectory,
}

pub type Result<T> = std::result::Result<T, CacheError>;
