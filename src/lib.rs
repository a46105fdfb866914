/// FarmCert - farm certification tracking service
///
/// Farmers register and watch their certification status; administrators
/// review farmers and set their status. Sessions use rotating JWT pairs and
/// the bundled [`client::SessionClient`] keeps them fresh transparently.

pub mod account;
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod farmers;
pub mod metrics;
pub mod rate_limit;
pub mod server;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{AppError, AppResult};
