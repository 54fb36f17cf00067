pub mod api;
pub mod config;
pub mod error;
pub mod relay;
pub mod serial;
pub mod store;

pub use api::AppState;
pub use config::Config;
pub use config::Diagnostic;
pub use config::LogLevel;
pub use config::format_diagnostics;
pub use error::ApiError;
pub use relay::RelayState;
pub use relay::StateRecord;
pub use serial::SerialBridge;
pub use store::StateStore;
pub use store::StoreError;
