//! Driver-side traits of the generic SQL interface.
//!
//! A driver implements these; applications talk to [`Db`](super::Db), which
//! owns pooling and bad-connection retries.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::context::Context;
use crate::error::Result;
use crate::value::{NamedValue, ScanType, Value};

/// Entry point of a driver.
pub trait Driver: Send + Sync {
    /// Open one connection by name (a DSN or a driver-specific key).
    fn open(&self, name: &str) -> Result<Box<dyn Conn>>;

    /// Resolve `name` once into a reusable connector.
    fn open_connector(&self, name: &str) -> Result<Box<dyn Connector>>;
}

/// Opens connections with fixed settings.
pub trait Connector: Send + Sync {
    fn connect(&self, ctx: &Context) -> Result<Box<dyn Conn>>;
}

/// One physical connection.
///
/// Returning [`Error::BadConn`](crate::Error::BadConn) from any method tells
/// the pool to discard this connection and retry on another.
pub trait Conn: Send {
    fn prepare(&mut self, ctx: &Context, query: &str) -> Result<Box<dyn Stmt>>;

    fn begin(&mut self, ctx: &Context, opts: &TxOptions) -> Result<Box<dyn Tx>>;

    fn exec(&mut self, ctx: &Context, query: &str, args: &[NamedValue]) -> Result<ExecResult>;

    fn query(&mut self, ctx: &Context, query: &str, args: &[NamedValue]) -> Result<Box<dyn Rows>>;

    fn ping(&mut self, ctx: &Context) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Checked by the pool before a connection is reused.
    fn is_valid(&self) -> bool {
        true
    }
}

/// A prepared statement.
pub trait Stmt: Send {
    /// Number of placeholders, if known.
    fn num_input(&self) -> Option<usize>;

    fn exec(&mut self, ctx: &Context, args: &[NamedValue]) -> Result<ExecResult>;

    fn query(&mut self, ctx: &Context, args: &[NamedValue]) -> Result<Box<dyn Rows>>;

    /// Context-less execution.
    fn exec_without_context(&mut self, args: &[Value]) -> Result<ExecResult>;

    /// Context-less query.
    fn query_without_context(&mut self, args: &[Value]) -> Result<Box<dyn Rows>>;

    fn close(&mut self) -> Result<()>;
}

/// A result set read one row at a time.
pub trait Rows: Send {
    /// Column names, in declared order.
    fn columns(&self) -> &[String];

    /// Decode the next row into `dest`, which must hold at least one slot
    /// per column. Returns `Ok(false)` at end of data.
    fn next(&mut self, dest: &mut [Value]) -> Result<bool>;

    /// Stop reading. Calling it more than once is harmless.
    fn close(&mut self) -> Result<()>;

    /// Upper-case database type name, e.g. `"INT4"`.
    fn column_type_database_type_name(&self, _index: usize) -> Option<String> {
        None
    }

    /// Length of a variable-length column type.
    fn column_type_length(&self, _index: usize) -> Option<i64> {
        None
    }

    /// `(precision, scale)` of a decimal column type.
    fn column_type_precision_scale(&self, _index: usize) -> Option<(i64, i64)> {
        None
    }

    fn column_type_scan_type(&self, _index: usize) -> ScanType {
        ScanType::Any
    }
}

/// A transaction started by [`Conn::begin`].
pub trait Tx: Send {
    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
}

/// Transaction isolation levels known to the generic interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    WriteCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
    Linearizable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Options for [`Conn::begin`].
#[derive(Debug, Clone, Default)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
    /// When set, a driver that supports session borrowing writes its session
    /// into the marker instead of starting a real transaction.
    pub borrow: Option<BorrowMarker>,
}

impl TxOptions {
    /// Options that only carry a borrow marker.
    pub fn borrow(marker: BorrowMarker) -> Self {
        Self {
            borrow: Some(marker),
            ..Default::default()
        }
    }
}

/// Output slot a driver fills during [`Conn::begin`].
///
/// Clones share the slot.
#[derive(Clone, Default)]
pub struct BorrowMarker {
    slot: Arc<Mutex<Option<Box<dyn Any + Send>>>>,
}

impl BorrowMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, replacing anything stored before.
    pub fn fill<T: Any + Send>(&self, value: T) -> Result<()> {
        *self.slot.lock()? = Some(Box::new(value));
        Ok(())
    }

    /// Take the stored value if it is a `T`.
    ///
    /// Returns `Ok(None)` when the slot is empty or holds another type; the
    /// slot is left empty either way.
    pub fn take<T: Any>(&self) -> Result<Option<T>> {
        let value = self.slot.lock()?.take();
        Ok(value.and_then(|v| v.downcast::<T>().ok()).map(|v| *v))
    }

    pub fn is_filled(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

impl fmt::Debug for BorrowMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BorrowMarker")
            .field("filled", &self.is_filled())
            .finish()
    }
}
