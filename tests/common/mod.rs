//! Scripted in-memory native session for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use zero_postgres_stdlib::catalog::TypeCatalog;
use zero_postgres_stdlib::native::{
    Args, CommandTag, Connect, ResultFormats, RowStream, Session, StatementDescription, TxOptions,
};
use zero_postgres_stdlib::sql::{self, ExecResult};
use zero_postgres_stdlib::value::NamedValue;
use zero_postgres_stdlib::{
    Config, Context, Error, FieldDescription, FormatCode, Oid, Result, TransactionStatus, Value,
};

/// Raw column bytes; `None` is NULL.
pub type Raw = Option<Vec<u8>>;

pub fn field(name: &str, oid: Oid, format: FormatCode) -> FieldDescription {
    FieldDescription::new(name, oid, format)
}

pub fn text(s: &str) -> Raw {
    Some(s.as_bytes().to_vec())
}

pub fn binary(bytes: &[u8]) -> Raw {
    Some(bytes.to_vec())
}

pub fn not_sent() -> Error {
    Error::NotSent(Box::new(Error::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "broken pipe",
    ))))
}

pub fn args<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Vec<NamedValue> {
    NamedValue::positional(values)
}

/// One scripted query result.
pub struct MockResult {
    pub fields: Vec<FieldDescription>,
    pub rows: Vec<Vec<Raw>>,
    /// Returned by `advance` after the last row.
    pub error: Option<Error>,
}

impl MockResult {
    pub fn new(fields: Vec<FieldDescription>) -> Self {
        Self {
            fields,
            rows: Vec::new(),
            error: None,
        }
    }

    pub fn row(mut self, values: Vec<Raw>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn fail_at_end(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }
}

/// Observable and scriptable state of one session.
pub struct MockState {
    pub config: Config,
    pub closed: bool,
    pub busy: bool,
    pub tx_status: TransactionStatus,
    pub calls: Vec<String>,
    pub exec_results: VecDeque<Result<CommandTag>>,
    pub query_results: VecDeque<Result<MockResult>>,
    pub last_args: Vec<Option<Value>>,
    pub last_formats: Option<ResultFormats>,
    pub advances: usize,
    pub rows_closed: usize,
    pub close_error: Option<Error>,
}

impl MockState {
    fn new(config: Config) -> Self {
        Self {
            config,
            closed: false,
            busy: false,
            tx_status: TransactionStatus::Idle,
            calls: Vec::new(),
            exec_results: VecDeque::new(),
            query_results: VecDeque::new(),
            last_args: Vec::new(),
            last_formats: None,
            advances: 0,
            rows_closed: 0,
            close_error: None,
        }
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls.iter().any(|c| c.starts_with(prefix))
    }
}

pub type SharedState = Arc<Mutex<MockState>>;

pub fn state(shared: &SharedState) -> MutexGuard<'_, MockState> {
    shared.lock().unwrap()
}

pub struct MockSession {
    state: SharedState,
    catalog: Arc<TypeCatalog>,
}

impl MockSession {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl Session for MockSession {
    type Rows = MockRows;

    fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn is_busy(&self) -> bool {
        self.state().busy
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.state().tx_status
    }

    fn catalog(&self) -> Arc<TypeCatalog> {
        Arc::clone(&self.catalog)
    }

    fn prepare(&mut self, _ctx: &Context, name: &str, query: &str) -> Result<StatementDescription> {
        self.state().calls.push(format!("prepare {} {}", name, query));
        let params = query.matches('$').count();
        Ok(StatementDescription {
            name: name.to_string(),
            query: query.to_string(),
            param_oids: vec![zero_postgres_stdlib::wire::oid::INT4; params],
            fields: Vec::new(),
        })
    }

    fn deallocate(&mut self, _ctx: &Context, name: &str) -> Result<()> {
        self.state().calls.push(format!("deallocate {}", name));
        Ok(())
    }

    fn exec(&mut self, ctx: &Context, query: &str, args: &Args) -> Result<CommandTag> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(format!("exec {}", query));
        state.last_args = args.to_vec();
        state
            .exec_results
            .pop_front()
            .unwrap_or_else(|| Ok(CommandTag("SELECT 0".into())))
    }

    fn query(
        &mut self,
        ctx: &Context,
        query: &str,
        formats: &ResultFormats,
        args: &Args,
    ) -> Result<MockRows> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(format!("query {}", query));
        state.last_args = args.to_vec();
        state.last_formats = Some(formats.clone());
        let result = state
            .query_results
            .pop_front()
            .unwrap_or_else(|| Ok(MockResult::new(Vec::new())))?;
        Ok(MockRows {
            state: Arc::clone(&self.state),
            fields: result.fields,
            rows: result.rows.into(),
            current: Vec::new(),
            error: result.error,
            started: false,
        })
    }

    fn begin(&mut self, _ctx: &Context, opts: &TxOptions) -> Result<()> {
        let mut state = self.state();
        state.calls.push(opts.begin_sql());
        state.tx_status = TransactionStatus::InTransaction;
        Ok(())
    }

    fn commit(&mut self, _ctx: &Context) -> Result<()> {
        let mut state = self.state();
        state.calls.push("commit".into());
        state.tx_status = TransactionStatus::Idle;
        Ok(())
    }

    fn rollback(&mut self, _ctx: &Context) -> Result<()> {
        let mut state = self.state();
        state.calls.push("rollback".into());
        state.tx_status = TransactionStatus::Idle;
        Ok(())
    }

    fn ping(&mut self, _ctx: &Context) -> Result<()> {
        self.state().calls.push("ping".into());
        Ok(())
    }

    fn close(&mut self, _ctx: &Context) -> Result<()> {
        let mut state = self.state();
        state.calls.push("close".into());
        state.closed = true;
        state.busy = false;
        state.close_error.take().map_or(Ok(()), Err)
    }
}

/// Rows of a scripted result. Field descriptions appear after the first
/// `advance`, like a real extended-protocol stream.
pub struct MockRows {
    state: SharedState,
    fields: Vec<FieldDescription>,
    rows: VecDeque<Vec<Raw>>,
    current: Vec<Raw>,
    error: Option<Error>,
    started: bool,
}

impl RowStream for MockRows {
    fn field_descriptions(&self) -> &[FieldDescription] {
        if self.started { &self.fields } else { &[] }
    }

    fn advance(&mut self) -> Result<bool> {
        self.started = true;
        self.state.lock().unwrap().advances += 1;
        if let Some(row) = self.rows.pop_front() {
            self.current = row;
            return Ok(true);
        }
        self.current.clear();
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(false),
        }
    }

    fn raw_value(&self, index: usize) -> Option<&[u8]> {
        self.current.get(index).and_then(|v| v.as_deref())
    }

    fn close(&mut self) {
        self.state.lock().unwrap().rows_closed += 1;
    }
}

type Setup = Arc<dyn Fn(&mut MockState) + Send + Sync>;

/// Opens [`MockSession`]s and keeps a handle to each one's state.
#[derive(Clone)]
pub struct MockConnect {
    sessions: Arc<Mutex<Vec<SharedState>>>,
    setup: Setup,
    catalog: Arc<TypeCatalog>,
}

impl MockConnect {
    pub fn new() -> Self {
        Self::with_setup(|_| {})
    }

    /// Run `setup` on every new session before it is returned.
    pub fn with_setup(setup: impl Fn(&mut MockState) + Send + Sync + 'static) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(Vec::new())),
            setup: Arc::new(setup),
            catalog: Arc::new(TypeCatalog::default()),
        }
    }

    pub fn connects(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> SharedState {
        Arc::clone(&self.sessions.lock().unwrap()[index])
    }

    pub fn last_session(&self) -> SharedState {
        let sessions = self.sessions.lock().unwrap();
        Arc::clone(sessions.last().unwrap())
    }
}

impl Connect for MockConnect {
    type Session = MockSession;

    fn connect(&self, ctx: &Context, config: &Config) -> Result<MockSession> {
        ctx.check()?;
        let mut state = MockState::new(config.clone());
        (self.setup)(&mut state);
        let state = Arc::new(Mutex::new(state));
        self.sessions.lock().unwrap().push(Arc::clone(&state));
        Ok(MockSession {
            state,
            catalog: Arc::clone(&self.catalog),
        })
    }
}

/// A generic connection from some other driver.
pub struct ForeignConn {
    pub rollbacks: Arc<AtomicUsize>,
}

struct ForeignTx {
    rollbacks: Arc<AtomicUsize>,
}

impl sql::Tx for ForeignTx {
    fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl sql::Conn for ForeignConn {
    fn prepare(&mut self, _ctx: &Context, _query: &str) -> Result<Box<dyn sql::Stmt>> {
        Err(Error::Unsupported("foreign".into()))
    }

    fn begin(&mut self, _ctx: &Context, _opts: &sql::TxOptions) -> Result<Box<dyn sql::Tx>> {
        Ok(Box::new(ForeignTx {
            rollbacks: Arc::clone(&self.rollbacks),
        }))
    }

    fn exec(&mut self, _ctx: &Context, _query: &str, _args: &[NamedValue]) -> Result<ExecResult> {
        Ok(ExecResult::default())
    }

    fn query(
        &mut self,
        _ctx: &Context,
        _query: &str,
        _args: &[NamedValue],
    ) -> Result<Box<dyn sql::Rows>> {
        Err(Error::Unsupported("foreign".into()))
    }

    fn ping(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct ForeignConnector {
    pub rollbacks: Arc<AtomicUsize>,
}

impl sql::Connector for ForeignConnector {
    fn connect(&self, _ctx: &Context) -> Result<Box<dyn sql::Conn>> {
        Ok(Box::new(ForeignConn {
            rollbacks: Arc::clone(&self.rollbacks),
        }))
    }
}
