use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid config {key}: {reason}")]
    InvalidConfig { key: String, reason: String },
}
