//! Generic SQL interface adapter for native PostgreSQL sessions.
//!
//! # Features
//!
//! - **Generic driver**: [`Driver`] plugs a native session into the pull-based
//!   [`sql`] interface (prepare, exec, query, transactions, row scanning)
//! - **Per-type decoding**: column values are decoded from whichever wire format
//!   the server used, binary for intrinsic types and text otherwise
//! - **Bad-connection signalling**: requests that never reached the server are
//!   reported as [`Error::BadConn`] so the pool retries on a fresh connection
//! - **Session borrowing**: [`Driver::acquire_session`] lends the native session
//!   behind a pooled connection for direct use
//!
//! # Example
//!
//! ```no_run
//! use zero_postgres_stdlib::native::Connect;
//! use zero_postgres_stdlib::sql::{Db, DbOptions};
//! use zero_postgres_stdlib::value::{NamedValue, Value};
//! use zero_postgres_stdlib::{Config, Context, Driver};
//!
//! fn run<C: Connect>(connect: C) -> zero_postgres_stdlib::Result<()> {
//!     let driver = Driver::new(connect);
//!     let config: Config = "postgres://postgres@localhost/mydb".parse()?;
//!     let db = driver.connector(config).into_db(DbOptions::default());
//!
//!     let ctx = Context::background();
//!     let mut rows = db.query(&ctx, "select $1::int4 as n", &NamedValue::positional([1]))?;
//!     let mut row = vec![Value::Null; rows.columns().len()];
//!     while rows.next(&mut row)? {
//!         println!("{:?}", row);
//!     }
//!
//!     let session = driver.acquire_session(&db)?;
//!     // ... use native-only features through session.lock()? ...
//!     driver.release_session(&db, &session)?;
//!     Ok(())
//! }
//! ```

mod borrow;
pub mod catalog;
pub mod config;
pub mod conn;
pub mod context;
pub mod decode;
pub mod driver;
pub mod error;
pub mod native;
pub mod rows;
pub mod sanitize;
pub mod session;
pub mod sql;
pub mod statement;
pub mod transaction;
pub mod value;
pub mod wire;

pub use config::{Config, SslMode};
pub use conn::Conn;
pub use context::Context;
pub use driver::{AfterConnect, ConfigConnector, Driver, NamedConnector};
pub use error::{Error, ErrorFields, Result};
pub use rows::Rows;
pub use session::{SessionHandle, SessionId};
pub use statement::Statement;
pub use transaction::{NoopTransaction, Transaction};
pub use value::{NamedValue, ScanType, Value};
pub use wire::{FieldDescription, FormatCode, Oid, TransactionStatus};
