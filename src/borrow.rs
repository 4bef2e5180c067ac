//! Session borrow registry.
//!
//! Borrowing a session starts a transaction on a pooled connection with a
//! [`BorrowMarker`]; the adapter lends its session instead of beginning, and
//! the pool keeps the connection checked out for as long as the transaction
//! is parked here. Releasing rolls the parked transaction back, which
//! returns the connection to the pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::native::Session;
use crate::session::{SessionHandle, SessionId};
use crate::sql::{BorrowMarker, Db, DbTx, TxOptions};

/// Bound on closing a session released in an unclean state.
const FORCE_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Parked transactions of borrowed sessions.
#[derive(Default)]
pub(crate) struct BorrowRegistry {
    parked: Mutex<HashMap<SessionId, DbTx>>,
}

impl BorrowRegistry {
    fn parked(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, DbTx>> {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn park(&self, id: SessionId, tx: DbTx) {
        self.parked().insert(id, tx);
    }

    /// Remove the entry for `id` if it was borrowed from `db`.
    fn take(&self, id: SessionId, db: &Db) -> Option<DbTx> {
        let mut parked = self.parked();
        if !parked.get(&id)?.belongs_to(db) {
            return None;
        }
        parked.remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.parked().len()
    }

    /// Borrow the session behind one of `db`'s connections.
    pub(crate) fn acquire<S: Session>(&self, db: &Arc<Db>) -> Result<SessionHandle<S>> {
        let marker = BorrowMarker::new();
        let tx = db.begin_tx(&Context::background(), &TxOptions::borrow(marker.clone()))?;

        let Some(session) = marker.take::<SessionHandle<S>>()? else {
            if let Err(e) = tx.rollback() {
                debug!("rollback of foreign transaction failed: {}", e);
            }
            return Err(Error::NotThisDriver);
        };

        debug!("borrowed session {:?}", session.id());
        self.park(session.id(), tx);
        Ok(session)
    }

    /// Give a borrowed session back to `db`.
    ///
    /// A session that was not borrowed from `db` is left untouched. A parked
    /// session that is busy or inside a transaction is closed first, so the
    /// pool discards it instead of reusing it.
    pub(crate) fn release<S: Session>(&self, db: &Db, session: &SessionHandle<S>) -> Result<()> {
        let tx = self.take(session.id(), db).ok_or(Error::NotAcquired)?;

        match session.lock() {
            Ok(mut native) => {
                if native.is_busy() || !native.transaction_status().is_idle() {
                    warn!("session {:?} released in unclean state, closing", session.id());
                    let ctx = Context::with_timeout(FORCE_CLOSE_TIMEOUT);
                    if let Err(e) = native.close(&ctx) {
                        warn!("closing released session failed: {}", e);
                    }
                }
            }
            Err(e) => warn!("released session {:?} is unusable: {}", session.id(), e),
        }

        debug!("released session {:?}", session.id());
        tx.rollback()
    }
}
