//! Prepared statement handle.

use std::time::Duration;

use crate::conn::{lock_open, run_exec, run_query};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::native::{Session, StatementDescription};
use crate::session::SessionHandle;
use crate::sql::{self, ExecResult};
use crate::value::{NamedValue, Value};

/// Bound on deallocating the statement in [`sql::Stmt::close`].
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A server-side prepared statement on one session.
///
/// Executes by name through the owning connection's exec/query paths.
pub struct Statement<S> {
    session: SessionHandle<S>,
    description: StatementDescription,
}

impl<S: Session> Statement<S> {
    pub(crate) fn new(session: SessionHandle<S>, description: StatementDescription) -> Self {
        Self {
            session,
            description,
        }
    }

    /// What the server reported when the statement was prepared.
    pub fn description(&self) -> &StatementDescription {
        &self.description
    }
}

impl<S: Session> sql::Stmt for Statement<S> {
    fn num_input(&self) -> Option<usize> {
        Some(self.description.param_oids.len())
    }

    fn exec(&mut self, ctx: &Context, args: &[NamedValue]) -> Result<ExecResult> {
        run_exec(&self.session, ctx, &self.description.name, args)
    }

    fn query(&mut self, ctx: &Context, args: &[NamedValue]) -> Result<Box<dyn sql::Rows>> {
        let rows = run_query(&self.session, ctx, &self.description.name, args)?;
        Ok(Box::new(rows))
    }

    fn exec_without_context(&mut self, _args: &[Value]) -> Result<ExecResult> {
        Err(Error::Deprecated("Stmt::exec_without_context"))
    }

    fn query_without_context(&mut self, _args: &[Value]) -> Result<Box<dyn sql::Rows>> {
        Err(Error::Deprecated("Stmt::query_without_context"))
    }

    fn close(&mut self) -> Result<()> {
        let ctx = Context::with_timeout(CLOSE_TIMEOUT);
        lock_open(&self.session)?.deallocate(&ctx, &self.description.name)
    }
}
