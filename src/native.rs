//! Contract of the native PostgreSQL session this crate adapts.
//!
//! The adapter drives the native client only through these traits. A client
//! implements [`Connect`] to open sessions, [`Session`] for one live protocol
//! connection and [`RowStream`] for the rows of one query.

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::TypeCatalog;
use crate::config::Config;
use crate::context::Context;
use crate::error::Result;
use crate::value::Value;
use crate::wire::{FieldDescription, FormatCode, Oid, TransactionStatus};

/// Positional query arguments; `None` is SQL NULL.
pub type Args = [Option<Value>];

/// Opens native sessions.
pub trait Connect: Send + Sync + 'static {
    type Session: Session;

    /// Establish a session. Must honor the context's deadline.
    fn connect(&self, ctx: &Context, config: &Config) -> Result<Self::Session>;
}

/// One live protocol connection.
///
/// Failures that happen before a request reaches the server are reported as
/// [`Error::NotSent`](crate::Error::NotSent) so callers can tell that a
/// retry on another connection is safe.
pub trait Session: Send + 'static {
    type Rows: RowStream;

    /// Returns true once the connection is closed or known dead.
    fn is_closed(&self) -> bool;

    /// Returns true while a request is in flight or a result is not fully read.
    fn is_busy(&self) -> bool;

    /// Transaction status from the last ReadyForQuery.
    fn transaction_status(&self) -> TransactionStatus;

    /// Type names known to this session.
    fn catalog(&self) -> Arc<TypeCatalog>;

    /// Prepare a named server-side statement.
    fn prepare(&mut self, ctx: &Context, name: &str, query: &str) -> Result<StatementDescription>;

    /// Drop a named server-side statement.
    fn deallocate(&mut self, ctx: &Context, name: &str) -> Result<()>;

    /// Run a statement (SQL text or prepared statement name) and discard rows.
    fn exec(&mut self, ctx: &Context, query: &str, args: &Args) -> Result<CommandTag>;

    /// Run a statement (SQL text or prepared statement name) and stream rows,
    /// asking the server for the given per-type result formats.
    fn query(
        &mut self,
        ctx: &Context,
        query: &str,
        formats: &ResultFormats,
        args: &Args,
    ) -> Result<Self::Rows>;

    /// Start a transaction block.
    fn begin(&mut self, ctx: &Context, opts: &TxOptions) -> Result<()>;

    fn commit(&mut self, ctx: &Context) -> Result<()>;

    fn rollback(&mut self, ctx: &Context) -> Result<()>;

    fn ping(&mut self, ctx: &Context) -> Result<()>;

    /// Terminate the connection.
    fn close(&mut self, ctx: &Context) -> Result<()>;
}

/// Rows of one query, pulled one at a time.
///
/// Field descriptions are only guaranteed after the first call to
/// [`RowStream::advance`].
pub trait RowStream: Send + 'static {
    fn field_descriptions(&self) -> &[FieldDescription];

    /// Move to the next row. `Ok(false)` means the result is exhausted.
    fn advance(&mut self) -> Result<bool>;

    /// Raw bytes of column `index` in the current row; `None` is NULL.
    fn raw_value(&self, index: usize) -> Option<&[u8]>;

    /// Stop reading and release the result.
    fn close(&mut self);
}

/// Prepared statement information.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementDescription {
    /// Statement name
    pub name: String,
    /// Statement SQL
    pub query: String,
    /// Parameter type OIDs
    pub param_oids: Vec<Oid>,
    /// Result columns (empty if the statement returns no rows)
    pub fields: Vec<FieldDescription>,
}

/// Completion tag of a statement, e.g. `INSERT 0 3`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandTag(pub String);

impl CommandTag {
    /// Rows affected, taken from the trailing number of the tag.
    pub fn rows_affected(&self) -> u64 {
        self.0
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }
}

/// Result format to request per column type. Types not listed use text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultFormats {
    by_oid: HashMap<Oid, FormatCode>,
}

impl ResultFormats {
    pub fn set(&mut self, oid: Oid, format: FormatCode) {
        self.by_oid.insert(oid, format);
    }

    pub fn format_for(&self, oid: Oid) -> FormatCode {
        self.by_oid.get(&oid).copied().unwrap_or_default()
    }
}

/// Native transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxIsoLevel {
    Serializable,
    RepeatableRead,
    ReadCommitted,
    ReadUncommitted,
}

/// Native transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxAccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

/// Options for [`Session::begin`]. `iso_level: None` uses the server default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub iso_level: Option<TxIsoLevel>,
    pub access_mode: TxAccessMode,
}

impl TxOptions {
    /// The `BEGIN` statement for these options.
    pub fn begin_sql(&self) -> String {
        let mut sql = String::from("begin");
        if let Some(level) = self.iso_level {
            sql.push_str(match level {
                TxIsoLevel::Serializable => " isolation level serializable",
                TxIsoLevel::RepeatableRead => " isolation level repeatable read",
                TxIsoLevel::ReadCommitted => " isolation level read committed",
                TxIsoLevel::ReadUncommitted => " isolation level read uncommitted",
            });
        }
        if self.access_mode == TxAccessMode::ReadOnly {
            sql.push_str(" read only");
        }
        sql
    }
}
