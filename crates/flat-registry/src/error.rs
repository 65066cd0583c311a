use crate::config::ConfigError;
use crate::records::RecordServiceError;
use crate::telemetry::TelemetryError;

/// Failure that ends a CLI command. HTTP handlers answer with their own
/// error bodies and never produce this.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("records error: {0}")]
    Records(#[from] RecordServiceError),
}
