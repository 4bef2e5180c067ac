//! Blocking connection pool over a [`Connector`].

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use std_semaphore::Semaphore;
use tracing::debug;

use super::driver::{Conn, Connector, Driver, ExecResult, Rows, Tx, TxOptions};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::NamedValue;

/// Bad-connection retries on a cached-or-new connection before the final
/// attempt on a forced new one.
const MAX_BAD_CONN_RETRIES: usize = 2;

/// Pool settings.
#[derive(Debug, Clone)]
pub struct DbOptions {
    /// Maximum number of idle connections kept for reuse.
    ///
    /// Default: `100`
    pub max_idle: usize,

    /// Maximum number of connections checked out at once.
    ///
    /// Default: `None` (unbounded)
    pub max_open: Option<usize>,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            max_idle: 100,
            max_open: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    CachedOrNew,
    AlwaysNew,
}

/// A pool of generic connections.
pub struct Db {
    connector: Box<dyn Connector>,
    idle: ArrayQueue<Box<dyn Conn>>,
    semaphore: Option<Semaphore>,
}

impl Db {
    pub fn new(connector: Box<dyn Connector>, options: DbOptions) -> Arc<Self> {
        let semaphore = options.max_open.map(|n| Semaphore::new(n as isize));
        Arc::new(Self {
            connector,
            idle: ArrayQueue::new(options.max_idle.max(1)),
            semaphore,
        })
    }

    /// Resolve `name` through `driver` into a pool. No connection is opened yet.
    pub fn open(driver: &dyn Driver, name: &str) -> Result<Arc<Self>> {
        Ok(Self::new(driver.open_connector(name)?, DbOptions::default()))
    }

    /// Number of idle connections.
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Check out a connection.
    pub fn conn(self: &Arc<Self>, ctx: &Context) -> Result<PooledConn> {
        self.retry(|strategy| self.conn_with(ctx, strategy))
    }

    pub fn exec(self: &Arc<Self>, ctx: &Context, query: &str, args: &[NamedValue]) -> Result<ExecResult> {
        self.retry(|strategy| {
            let mut conn = self.conn_with(ctx, strategy)?;
            let result = conn.exec(ctx, query, args);
            conn.check(result)
        })
    }

    pub fn query(self: &Arc<Self>, ctx: &Context, query: &str, args: &[NamedValue]) -> Result<DbRows> {
        self.retry(|strategy| {
            let mut conn = self.conn_with(ctx, strategy)?;
            let result = conn.query(ctx, query, args);
            let rows = conn.check(result)?;
            Ok(DbRows {
                rows,
                _conn: conn,
            })
        })
    }

    pub fn ping(self: &Arc<Self>, ctx: &Context) -> Result<()> {
        self.retry(|strategy| {
            let mut conn = self.conn_with(ctx, strategy)?;
            let result = conn.ping(ctx);
            conn.check(result)
        })
    }

    /// Start a transaction. The connection stays checked out until the
    /// transaction finishes.
    pub fn begin_tx(self: &Arc<Self>, ctx: &Context, opts: &TxOptions) -> Result<DbTx> {
        self.retry(|strategy| {
            let mut conn = self.conn_with(ctx, strategy)?;
            let result = conn.begin(ctx, opts);
            let tx = conn.check(result)?;
            Ok(DbTx {
                tx: Some(tx),
                conn,
            })
        })
    }

    /// Close all idle connections.
    pub fn close(&self) {
        while let Some(conn) = self.idle.pop() {
            discard(conn);
        }
    }

    fn retry<T>(&self, mut f: impl FnMut(Strategy) -> Result<T>) -> Result<T> {
        for _ in 0..MAX_BAD_CONN_RETRIES {
            match f(Strategy::CachedOrNew) {
                Err(Error::BadConn) => debug!("bad connection, retrying"),
                result => return result,
            }
        }
        f(Strategy::AlwaysNew)
    }

    /// The wait for a `max_open` permit is not interruptible; the context is
    /// checked again once the permit is held.
    fn conn_with(self: &Arc<Self>, ctx: &Context, strategy: Strategy) -> Result<PooledConn> {
        ctx.check()?;
        if let Some(sem) = &self.semaphore {
            sem.acquire();
            if let Err(e) = ctx.check() {
                sem.release();
                return Err(e);
            }
        }
        let conn = match self.pop_idle(strategy) {
            Some(conn) => conn,
            None => match self.connector.connect(ctx) {
                Ok(conn) => conn,
                Err(e) => {
                    if let Some(sem) = &self.semaphore {
                        sem.release();
                    }
                    return Err(e);
                }
            },
        };
        Ok(PooledConn {
            conn: ManuallyDrop::new(conn),
            db: Arc::clone(self),
            bad: false,
        })
    }

    fn pop_idle(&self, strategy: Strategy) -> Option<Box<dyn Conn>> {
        if strategy == Strategy::AlwaysNew {
            return None;
        }
        while let Some(mut conn) = self.idle.pop() {
            if conn.is_valid() {
                return Some(conn);
            }
            discard(conn);
        }
        None
    }

    fn check_in(&self, conn: Box<dyn Conn>, bad: bool) {
        if bad || !conn.is_valid() {
            debug!("discarding connection");
            discard(conn);
            return;
        }
        if let Err(conn) = self.idle.push(conn) {
            discard(conn);
        }
    }
}

fn discard(mut conn: Box<dyn Conn>) {
    if let Err(e) = conn.close() {
        debug!("error closing connection: {}", e);
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        self.close();
    }
}

/// A connection checked out of a [`Db`]. Returned to the pool on drop.
pub struct PooledConn {
    db: Arc<Db>,
    conn: ManuallyDrop<Box<dyn Conn>>,
    bad: bool,
}

impl PooledConn {
    /// The pool this connection belongs to.
    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    /// Remember a bad-connection result so the connection is discarded.
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(Error::BadConn)) {
            self.bad = true;
        }
        result
    }
}

impl Deref for PooledConn {
    type Target = dyn Conn;
    fn deref(&self) -> &Self::Target {
        &**self.conn
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.conn
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        // SAFETY: conn is never accessed after this
        let conn = unsafe { ManuallyDrop::take(&mut self.conn) };
        self.db.check_in(conn, self.bad);
        if let Some(sem) = &self.db.semaphore {
            sem.release();
        }
    }
}

/// A transaction holding its connection out of the pool.
///
/// Dropping an unfinished transaction rolls it back.
pub struct DbTx {
    tx: Option<Box<dyn Tx>>,
    conn: PooledConn,
}

impl DbTx {
    /// Returns true if this transaction runs on a connection from `db`.
    pub fn belongs_to(&self, db: &Db) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.conn.db), db)
    }

    pub fn exec(&mut self, ctx: &Context, query: &str, args: &[NamedValue]) -> Result<ExecResult> {
        let result = self.conn.exec(ctx, query, args);
        self.conn.check(result)
    }

    /// Query inside the transaction. The rows must be closed before the
    /// transaction finishes.
    pub fn query(&mut self, ctx: &Context, query: &str, args: &[NamedValue]) -> Result<Box<dyn Rows>> {
        let result = self.conn.query(ctx, query, args);
        self.conn.check(result)
    }

    pub fn commit(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => {
                let result = tx.commit();
                self.conn.check(result)
            }
            None => Ok(()),
        }
    }

    pub fn rollback(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => {
                let result = tx.rollback();
                self.conn.check(result)
            }
            None => Ok(()),
        }
    }
}

impl Drop for DbTx {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take()
            && let Err(e) = tx.rollback()
        {
            debug!("rollback on drop failed: {}", e);
            self.conn.bad = true;
        }
    }
}

/// Rows holding their connection out of the pool until dropped.
pub struct DbRows {
    rows: Box<dyn Rows>,
    _conn: PooledConn,
}

impl Deref for DbRows {
    type Target = dyn Rows;
    fn deref(&self) -> &Self::Target {
        &*self.rows
    }
}

impl DerefMut for DbRows {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.rows
    }
}

impl Drop for DbRows {
    fn drop(&mut self) {
        if let Err(e) = self.rows.close() {
            debug!("error closing rows: {}", e);
        }
    }
}
