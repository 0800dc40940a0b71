pub mod alerts;
pub mod capture;
pub mod config;
pub mod error;
pub mod flattener;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod provider_client;

// Re-exports for convenience
pub use capture::{CaptureReport, CaptureStamp, run_capture};
pub use error::ChainError;
pub use flattener::flatten;
pub use models::{ChainLocation, FlatContractRecord, NormalizedContractRecord, OptionSide, RawChainResponse};
pub use normalizer::{CoercionFallback, NormalizedContract, derive_primary_key, normalize, normalize_record};
pub use provider_client::ChainClient;
