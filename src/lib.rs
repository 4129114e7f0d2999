pub mod auth;
pub mod constant;
pub mod error;
mod opts;
mod prepared;
pub mod protocol;
mod row;
pub mod sync;
mod transport;

pub use auth::{AuthPlugin, AuthPlugins};
pub use opts::Opts;
pub use prepared::PreparedStatement;
pub use row::Row;
pub use transport::Stream;

#[cfg(feature = "tokio")]
pub mod tokio;
