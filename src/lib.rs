//! # monkdb: MonkDB HTTP client
//!
//! Sends SQL to a cluster of interchangeable MonkDB nodes over HTTP, fails
//! over between them, and converts result rows into native values.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use monkdb::prelude::*;
//! use serde_json::json;
//!
//! let conn = Connection::connect(ClientOptions::new(["http://db1:4200", "http://db2:4200"]))?;
//! let mut cursor = conn.cursor()?;
//! let stmt = "SELECT name, hostname FROM sys.nodes WHERE load['1'] > ?";
//! cursor.execute(stmt, &[json!(0.5)]).await?;
//! for row in cursor.fetch_all() {
//!     println!("{:?}", row);
//! }
//! ```
//!
//! ## Failover
//!
//! | Outcome              | Action                                  |
//! |----------------------|-----------------------------------------|
//! | 2xx                  | decode result                           |
//! | 4xx                  | return the server error, no retry       |
//! | 5xx, network failure | quarantine node, back off, try the next |

pub mod blob;
pub mod client;
pub mod config;
pub mod connection;
pub mod converter;
pub mod cursor;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod retry;
pub mod transport;
pub mod types;
pub mod value;

pub use blob::BlobContainer;
pub use client::Client;
pub use config::ClientOptions;
pub use connection::Connection;
pub use converter::{Converter, ConverterFn};
pub use cursor::{ColumnDescription, ColumnIndex, Cursor, Row};
pub use error::{MonkError, MonkResult};
pub use pool::{Endpoint, PoolSnapshot, ServerPool};
pub use protocol::{ResultBatch, ResultInfo, SqlArgs};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, Request, Response, Transport};
pub use types::{DataType, TypeDescriptor};
pub use value::Value;

pub use tokio_util::sync::CancellationToken;

pub mod prelude {
    pub use crate::client::Client;
    pub use crate::config::ClientOptions;
    pub use crate::connection::Connection;
    pub use crate::converter::{Converter, converter_fn};
    pub use crate::cursor::{Cursor, Row};
    pub use crate::error::*;
    pub use crate::protocol::SqlArgs;
    pub use crate::types::{DataType, TypeDescriptor};
    pub use crate::value::Value;
}

/// Connect with the given options and the standard converter.
///
/// # Example
///
/// ```
/// let conn = monkdb::connect(monkdb::ClientOptions::default()).unwrap();
/// assert!(!conn.is_closed());
/// ```
pub fn connect(options: ClientOptions) -> MonkResult<Connection> {
    Connection::connect(options)
}
