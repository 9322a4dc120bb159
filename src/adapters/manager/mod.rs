//! HTTP adapter for the manager service.

pub mod errors;
pub mod http_client;

pub use errors::ManagerApiError;
pub use http_client::HttpVerificationManager;
