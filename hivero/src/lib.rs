//! HiveServer2 Driver
//!
//! # Examples
//!
//! ```no_run
//! use hivero::{Config, Session};
//!
//! # async fn app() -> hivero::Result<()> {
//! let config = Config::parse("hive2://etl@warehouse:10000/sales")?;
//! let session = Session::connect(config).await?;
//!
//! let op = session.execute("SELECT id, name FROM customers").await?;
//! let mut rows = op.rows().await?;
//! while rows.next().await? {
//!     let id = rows.get(0)?.as_i64();
//!     let name = rows.get(1)?.as_str().map(str::to_owned);
//!     println!("{id:?} {name:?}");
//! }
//!
//! op.close().await;
//! session.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! Endpoint discovery through a coordination ensemble:
//!
//! ```no_run
//! use hivero::{Config, Session};
//!
//! # async fn app() -> hivero::Result<()> {
//! let config = Config::parse(
//!     "hive2://zk1:2181,zk2:2181,zk3:2181/?serviceDiscoveryMode=zooKeeper",
//! )?;
//! let session = Session::connect(config).await?;
//! # Ok(())
//! # }
//! ```

pub mod common;
mod transport;

// Protocol
pub mod thrift;

// Component
pub mod metadata;
mod cache;
pub mod value;
pub mod rows;

// Operation
pub mod client;
pub mod operation;

// Connection
pub mod config;
pub mod session;
mod discovery;

mod error;

#[cfg(test)]
mod testkit;

pub use client::{CliService, Client};
pub use config::{Config, ConfigError};
pub use error::{Error, ErrorKind, Result, ServerError};
pub use metadata::{ColumnDescriptor, HiveType, Schema, TypeDescriptor};
pub use operation::Operation;
pub use rows::{RowBatch, Rows};
pub use session::{Connector, Session};
pub use thrift::ProtocolVersion;
pub use value::Value;
