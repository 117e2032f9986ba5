pub mod http_stub;
pub mod pipeline;
pub mod tempdir;

// Re-export the unique_temp_dir function for easy access
pub use tempdir::unique_temp_dir;
