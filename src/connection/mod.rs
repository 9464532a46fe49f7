mod connection;
mod types;

pub use connection::Connection;
pub use types::{ConnectionError, ConnectionResult};

pub(crate) use types::ConnectionState;
