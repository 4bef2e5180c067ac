//! Generic pull-based SQL interface.
//!
//! [`driver`] holds the traits a database driver implements; [`pool`] holds
//! [`Db`], the application-facing pool that retries on
//! [`Error::BadConn`](crate::Error::BadConn).

pub mod driver;
pub mod pool;

pub use driver::{
    BorrowMarker, Conn, Connector, Driver, ExecResult, IsolationLevel, Rows, Stmt, Tx, TxOptions,
};
pub use pool::{Db, DbOptions, DbRows, DbTx, PooledConn};
