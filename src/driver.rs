//! Driver and connectors: open native sessions as generic connections.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::borrow::BorrowRegistry;
use crate::config::Config;
use crate::conn::Conn;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::native::{Connect, Session};
use crate::session::SessionHandle;
use crate::sql::{self, Db};

/// Overall bound on [`sql::Driver::open`].
const OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Prefix of the names handed out by [`Driver::register_config`].
const REGISTERED_PREFIX: &str = "registeredConnConfig";

/// Hook run once on every newly established session.
pub type AfterConnect<S> = Arc<dyn Fn(&Context, &mut S) -> Result<()> + Send + Sync>;

#[derive(Default)]
struct ConfigTable {
    next: u64,
    configs: HashMap<String, Config>,
}

struct Inner<C> {
    connect: C,
    configs: Mutex<ConfigTable>,
    borrowed: BorrowRegistry,
}

/// Opens native sessions for the generic interface.
///
/// Construct one per process and pass clones around; clones share the
/// registered configurations and the borrowed sessions.
pub struct Driver<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Driver<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for Driver<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").finish_non_exhaustive()
    }
}

impl<C: Connect> Driver<C> {
    pub fn new(connect: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                connect,
                configs: Mutex::new(ConfigTable::default()),
                borrowed: BorrowRegistry::default(),
            }),
        }
    }

    fn configs(&self) -> MutexGuard<'_, ConfigTable> {
        self.inner
            .configs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `config` and return a name that opens it.
    ///
    /// Every call returns a new name, even for identical configurations.
    pub fn register_config(&self, config: Config) -> String {
        let mut table = self.configs();
        let name = format!("{}{}", REGISTERED_PREFIX, table.next);
        table.next += 1;
        table.configs.insert(name.clone(), config);
        name
    }

    /// Forget a registered configuration. Opening `name` afterwards parses
    /// it as a connection string.
    pub fn unregister_config(&self, name: &str) {
        self.configs().configs.remove(name);
    }

    /// A connector that opens sessions from `config` directly.
    pub fn connector(&self, config: Config) -> ConfigConnector<C> {
        ConfigConnector {
            driver: self.clone(),
            config,
            after_connect: None,
        }
    }

    /// Borrow the native session behind one of `db`'s connections.
    ///
    /// The connection stays checked out of `db` until
    /// [`release_session`](Self::release_session).
    pub fn acquire_session(&self, db: &Arc<Db>) -> Result<SessionHandle<C::Session>> {
        self.inner.borrowed.acquire(db)
    }

    /// Return a session obtained from [`acquire_session`](Self::acquire_session)
    /// on the same `db`.
    pub fn release_session(&self, db: &Db, session: &SessionHandle<C::Session>) -> Result<()> {
        self.inner.borrowed.release(db, session)
    }

    /// Number of sessions currently borrowed.
    pub fn borrowed_count(&self) -> usize {
        self.inner.borrowed.len()
    }

    /// A registered configuration, or `name` parsed as a connection string.
    fn resolve(&self, name: &str) -> Result<Config> {
        if let Some(config) = self.configs().configs.get(name) {
            return Ok(config.clone());
        }
        Config::parse(name)
    }

    fn connect(
        &self,
        ctx: &Context,
        config: &Config,
        after_connect: Option<&AfterConnect<C::Session>>,
    ) -> Result<Conn<C::Session>> {
        ctx.check()?;
        let ctx = match config.connect_timeout {
            Some(timeout) => ctx.child_with_timeout(timeout),
            None => ctx.clone(),
        };

        let mut session = self.inner.connect.connect(&ctx, config)?;
        debug!("connected to {}:{}", config.host, config.port);

        if let Some(hook) = after_connect
            && let Err(e) = hook(&ctx, &mut session)
        {
            if let Err(close_err) = session.close(&ctx) {
                debug!("closing session after failed hook: {}", close_err);
            }
            return Err(Error::Hook(Box::new(e)));
        }

        Ok(Conn::new(session))
    }
}

impl<C: Connect> sql::Driver for Driver<C> {
    fn open(&self, name: &str) -> Result<Box<dyn sql::Conn>> {
        let ctx = Context::with_timeout(OPEN_TIMEOUT);
        self.open_connector(name)?.connect(&ctx)
    }

    fn open_connector(&self, name: &str) -> Result<Box<dyn sql::Connector>> {
        Ok(Box::new(NamedConnector {
            driver: self.clone(),
            name: name.to_string(),
        }))
    }
}

/// Connector for a name: a registered configuration key or a connection
/// string. The name is resolved on every connect.
pub struct NamedConnector<C> {
    driver: Driver<C>,
    name: String,
}

impl<C: Connect> sql::Connector for NamedConnector<C> {
    fn connect(&self, ctx: &Context) -> Result<Box<dyn sql::Conn>> {
        let config = self.driver.resolve(&self.name)?;
        Ok(Box::new(self.driver.connect(ctx, &config, None)?))
    }
}

/// Connector for a fixed [`Config`].
pub struct ConfigConnector<C: Connect> {
    driver: Driver<C>,
    config: Config,
    after_connect: Option<AfterConnect<C::Session>>,
}

impl<C: Connect> ConfigConnector<C> {
    /// Run `hook` on every new session before it is used. A hook error
    /// closes the session and fails the connect.
    pub fn after_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context, &mut C::Session) -> Result<()> + Send + Sync + 'static,
    {
        self.after_connect = Some(Arc::new(hook));
        self
    }

    /// A pool over this connector.
    pub fn into_db(self, options: sql::DbOptions) -> Arc<Db> {
        Db::new(Box::new(self), options)
    }
}

impl<C: Connect> sql::Connector for ConfigConnector<C> {
    fn connect(&self, ctx: &Context) -> Result<Box<dyn sql::Conn>> {
        Ok(Box::new(self.driver.connect(
            ctx,
            &self.config,
            self.after_connect.as_ref(),
        )?))
    }
}
