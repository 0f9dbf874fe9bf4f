pub use app_error::{AppError, AppResult};
pub use close_signal::CloseSignal;
pub use self::config::{AppConfig, NetworkConfig, TimingConfig};
pub use tracing_config::{setup_file_tracing, setup_local_tracing};

mod app_error;
mod close_signal;
mod config;
mod tracing_config;
