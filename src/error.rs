pub use masterror::{AppError, AppResult};

/// Create file read error
pub fn file_read_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to read file '{}': {}", path, source))
}

/// Create file write error
pub fn file_write_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to write file '{}': {}", path, source))
}

/// Create config error
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Create metadata provider error
///
/// Provider failures never abort extraction; the pipeline turns them into a
/// diagnostic. The error type exists so providers can report what went wrong.
pub fn metadata_error(table: &str, message: impl Into<String>) -> AppError {
    AppError::service(format!(
        "Metadata lookup for '{}' failed: {}",
        table,
        message.into()
    ))
}

/// Create lineage storage error
pub fn storage_error(message: impl Into<String>) -> AppError {
    AppError::internal(format!("Lineage storage error: {}", message.into()))
}

/// Create error for a rejected lineage edge
pub fn invalid_edge_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(format!("Invalid lineage edge: {}", message.into()))
}

/// Create serialization error for rendered output or snapshots
pub fn output_error(message: impl Into<String>) -> AppError {
    AppError::internal(format!("Serialization failed: {}", message.into()))
}
