//! Transactions handed to the generic interface.

use crate::context::Context;
use crate::error::Result;
use crate::native::Session;
use crate::session::SessionHandle;
use crate::sql;

/// A real transaction on a native session.
///
/// Commit and rollback run with the context the transaction was started with.
pub struct Transaction<S> {
    session: SessionHandle<S>,
    ctx: Context,
}

impl<S: Session> Transaction<S> {
    pub(crate) fn new(session: SessionHandle<S>, ctx: Context) -> Self {
        Self { session, ctx }
    }
}

impl<S: Session> sql::Tx for Transaction<S> {
    fn commit(self: Box<Self>) -> Result<()> {
        self.session.lock()?.commit(&self.ctx)
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        self.session.lock()?.rollback(&self.ctx)
    }
}

/// Stand-in returned when `begin` lends out its session instead of starting
/// a transaction. Commit and rollback never reach the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransaction;

impl sql::Tx for NoopTransaction {
    fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
