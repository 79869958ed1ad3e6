pub mod codec;
pub mod error;
pub mod protocol;
pub mod qos;
pub mod return_code;
pub mod topic;

/// A specialized `Result` type for wire-level operations.
pub type Result<T> = std::result::Result<T, crate::error::Error>;
