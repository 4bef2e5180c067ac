//! Connection adapter: generic driver verbs on one native session.

use std::sync::MutexGuard;
use std::time::Duration;

use tracing::{debug, trace};

use crate::context::Context;
use crate::decode;
use crate::error::{Error, Result};
use crate::native::{self, Session, TxAccessMode, TxIsoLevel};
use crate::rows::Rows;
use crate::sanitize::sanitize_sql;
use crate::session::SessionHandle;
use crate::sql::{self, ExecResult, IsolationLevel};
use crate::statement::Statement;
use crate::transaction::{NoopTransaction, Transaction};
use crate::value::{NamedValue, Value};

/// Grace period for a clean shutdown in [`sql::Conn::close`].
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A generic connection backed by one native session.
pub struct Conn<S> {
    session: SessionHandle<S>,
    /// Counter for unique prepared statement names.
    statement_count: u64,
}

impl<S: Session> Conn<S> {
    pub(crate) fn new(session: S) -> Self {
        Self {
            session: SessionHandle::new(session),
            statement_count: 0,
        }
    }

    /// The underlying native session.
    pub fn session(&self) -> &SessionHandle<S> {
        &self.session
    }
}

impl<S: Session> sql::Conn for Conn<S> {
    fn prepare(&mut self, ctx: &Context, query: &str) -> Result<Box<dyn sql::Stmt>> {
        let mut session = lock_open(&self.session)?;

        let name = format!("stdlib_{}", self.statement_count);
        self.statement_count += 1;

        let description = session.prepare(ctx, &name, query)?;
        drop(session);
        debug!("prepared statement {}", description.name);

        Ok(Box::new(Statement::new(self.session.clone(), description)))
    }

    fn begin(&mut self, ctx: &Context, opts: &sql::TxOptions) -> Result<Box<dyn sql::Tx>> {
        let mut session = lock_open(&self.session)?;

        if let Some(marker) = &opts.borrow {
            drop(session);
            marker.fill(self.session.clone())?;
            debug!("lending session {:?} to borrower", self.session.id());
            return Ok(Box::new(NoopTransaction));
        }

        let native_opts = native_tx_options(opts)?;
        session.begin(ctx, &native_opts)?;
        drop(session);

        Ok(Box::new(Transaction::new(self.session.clone(), ctx.clone())))
    }

    fn exec(&mut self, ctx: &Context, query: &str, args: &[NamedValue]) -> Result<ExecResult> {
        run_exec(&self.session, ctx, query, args)
    }

    fn query(&mut self, ctx: &Context, query: &str, args: &[NamedValue]) -> Result<Box<dyn sql::Rows>> {
        let rows = run_query(&self.session, ctx, query, args)?;
        Ok(Box::new(rows))
    }

    fn ping(&mut self, ctx: &Context) -> Result<()> {
        lock_open(&self.session)?.ping(ctx)
    }

    fn close(&mut self) -> Result<()> {
        let ctx = Context::with_timeout(CLOSE_TIMEOUT);
        let mut session = self.session.lock()?;
        if session.is_closed() {
            return Ok(());
        }
        debug!("closing session {:?}", self.session.id());
        session.close(&ctx)
    }

    fn is_valid(&self) -> bool {
        self.session
            .lock()
            .map(|session| !session.is_closed())
            .unwrap_or(false)
    }
}

/// Lock the session, failing with [`Error::BadConn`] if it is closed.
pub(crate) fn lock_open<S: Session>(session: &SessionHandle<S>) -> Result<MutexGuard<'_, S>> {
    let guard = session.lock().map_err(|_| Error::BadConn)?;
    if guard.is_closed() {
        return Err(Error::BadConn);
    }
    Ok(guard)
}

/// Run `query` (SQL text or a prepared statement name) and discard rows.
pub(crate) fn run_exec<S: Session>(
    handle: &SessionHandle<S>,
    ctx: &Context,
    query: &str,
    args: &[NamedValue],
) -> Result<ExecResult> {
    let mut session = lock_open(handle)?;
    trace_sql("exec", query, args);

    let tag = session
        .exec(ctx, query, &native_args(args))
        .map_err(retry_as_bad_conn)?;
    Ok(ExecResult {
        rows_affected: tag.rows_affected(),
    })
}

/// Run `query` (SQL text or a prepared statement name) and fetch its first
/// row so column metadata is known before returning.
pub(crate) fn run_query<S: Session>(
    handle: &SessionHandle<S>,
    ctx: &Context,
    query: &str,
    args: &[NamedValue],
) -> Result<Rows<S::Rows>> {
    let mut session = lock_open(handle)?;
    trace_sql("query", query, args);

    let mut stream = session
        .query(ctx, query, decode::binary_result_formats(), &native_args(args))
        .map_err(retry_as_bad_conn)?;
    let catalog = session.catalog();
    drop(session);

    let more = match native::RowStream::advance(&mut stream) {
        Ok(more) => more,
        Err(e) => {
            native::RowStream::close(&mut stream);
            return Err(e);
        }
    };
    Ok(Rows::new(stream, catalog, more))
}

/// Positional native arguments. NULL becomes an absent value.
fn native_args(args: &[NamedValue]) -> Vec<Option<Value>> {
    args.iter().map(|arg| arg.value.clone().into_arg()).collect()
}

/// A request that never reached the server can be resent on a new connection.
fn retry_as_bad_conn(err: Error) -> Error {
    if err.safe_to_retry() {
        debug!("request not sent, reporting bad connection: {}", err);
        Error::BadConn
    } else {
        err
    }
}

fn native_tx_options(opts: &sql::TxOptions) -> Result<native::TxOptions> {
    let iso_level = match opts.isolation {
        IsolationLevel::Default => None,
        IsolationLevel::ReadUncommitted => Some(TxIsoLevel::ReadUncommitted),
        IsolationLevel::ReadCommitted => Some(TxIsoLevel::ReadCommitted),
        IsolationLevel::RepeatableRead | IsolationLevel::Snapshot => {
            Some(TxIsoLevel::RepeatableRead)
        }
        IsolationLevel::Serializable => Some(TxIsoLevel::Serializable),
        level @ (IsolationLevel::WriteCommitted | IsolationLevel::Linearizable) => {
            return Err(Error::UnsupportedIsolation(level));
        }
    };
    let access_mode = if opts.read_only {
        TxAccessMode::ReadOnly
    } else {
        TxAccessMode::ReadWrite
    };
    Ok(native::TxOptions {
        iso_level,
        access_mode,
    })
}

fn trace_sql(op: &str, query: &str, args: &[NamedValue]) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    let values: Vec<Value> = args.iter().map(|arg| arg.value.clone()).collect();
    match sanitize_sql(query, &values) {
        Ok(sql) => trace!("{}: {}", op, sql),
        Err(e) => {
            debug!("could not inline arguments for trace: {}", e);
            trace!("{}: {}", op, query);
        }
    }
}
