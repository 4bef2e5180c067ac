//! Tests for borrowing native sessions out of a pool

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{ForeignConnector, MockConnect, state};
use zero_postgres_stdlib::native::Session;
use zero_postgres_stdlib::sql::{Db, DbOptions};
use zero_postgres_stdlib::{Config, Context, Driver, Error, TransactionStatus};

fn pool(connect: &MockConnect) -> (Driver<MockConnect>, Arc<Db>) {
    let driver = Driver::new(connect.clone());
    let db = driver.connector(Config::default()).into_db(DbOptions::default());
    (driver, db)
}

#[test]
fn test_acquire_and_release() {
    let connect = MockConnect::new();
    let (driver, db) = pool(&connect);

    let session = driver.acquire_session(&db).unwrap();
    assert_eq!(driver.borrowed_count(), 1);
    assert_eq!(db.idle_count(), 0);

    session
        .lock()
        .unwrap()
        .exec(&Context::background(), "listen events", &[])
        .unwrap();

    driver.release_session(&db, &session).unwrap();
    assert_eq!(driver.borrowed_count(), 0);
    assert_eq!(db.idle_count(), 1);

    // The lent-out begin never reached the server.
    let calls = state(&connect.session(0)).calls.clone();
    assert_eq!(calls, vec!["exec listen events"]);
}

#[test]
fn test_double_release_is_not_acquired() {
    let connect = MockConnect::new();
    let (driver, db) = pool(&connect);

    let session = driver.acquire_session(&db).unwrap();
    driver.release_session(&db, &session).unwrap();

    let err = driver.release_session(&db, &session).unwrap_err();
    assert!(matches!(err, Error::NotAcquired), "{err}");
    assert_eq!(err.to_string(), "can't release session that is not acquired");
    assert_eq!(db.idle_count(), 1);
}

#[test]
fn test_released_session_is_reused() {
    let connect = MockConnect::new();
    let (driver, db) = pool(&connect);

    let first = driver.acquire_session(&db).unwrap();
    driver.release_session(&db, &first).unwrap();
    let second = driver.acquire_session(&db).unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(connect.connects(), 1);
    driver.release_session(&db, &second).unwrap();
}

#[test]
fn test_borrowed_connection_is_not_shared() {
    let connect = MockConnect::new();
    let (driver, db) = pool(&connect);

    let session = driver.acquire_session(&db).unwrap();
    db.exec(&Context::background(), "select 1", &[]).unwrap();

    assert_eq!(connect.connects(), 2);
    assert!(state(&connect.session(0)).calls.is_empty());
    assert!(state(&connect.session(1)).called("exec select 1"));
    driver.release_session(&db, &session).unwrap();
}

#[test]
fn test_foreign_connection_is_not_this_driver() {
    let rollbacks = Arc::new(AtomicUsize::new(0));
    let db = Db::new(
        Box::new(ForeignConnector {
            rollbacks: Arc::clone(&rollbacks),
        }),
        DbOptions::default(),
    );
    let driver = Driver::new(MockConnect::new());

    let err = driver.acquire_session(&db).unwrap_err();
    assert!(matches!(err, Error::NotThisDriver), "{err}");
    assert_eq!(driver.borrowed_count(), 0);
    assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(db.idle_count(), 1);
}

#[test]
fn test_unclean_session_is_closed_on_release() {
    let connect = MockConnect::new();
    let (driver, db) = pool(&connect);

    let session = driver.acquire_session(&db).unwrap();
    session
        .lock()
        .unwrap()
        .begin(&Context::background(), &Default::default())
        .unwrap();
    assert_eq!(
        session.lock().unwrap().transaction_status(),
        TransactionStatus::InTransaction
    );

    driver.release_session(&db, &session).unwrap();

    assert!(state(&connect.session(0)).closed);
    assert_eq!(driver.borrowed_count(), 0);
    assert_eq!(db.idle_count(), 0);
}

#[test]
fn test_busy_session_is_closed_on_release() {
    let connect = MockConnect::new();
    let (driver, db) = pool(&connect);

    let session = driver.acquire_session(&db).unwrap();
    state(&connect.session(0)).busy = true;

    driver.release_session(&db, &session).unwrap();

    let calls = state(&connect.session(0)).calls.clone();
    assert_eq!(calls, vec!["close"]);
    assert_eq!(db.idle_count(), 0);

    // The pool opens a fresh connection next time.
    db.ping(&Context::background()).unwrap();
    assert_eq!(connect.connects(), 2);
}

#[test]
fn test_release_into_other_pool_is_not_acquired() {
    let connect = MockConnect::new();
    let (driver, db) = pool(&connect);
    let other = driver
        .connector(Config::default())
        .into_db(DbOptions::default());

    let session = driver.acquire_session(&db).unwrap();

    let err = driver.release_session(&other, &session).unwrap_err();
    assert!(matches!(err, Error::NotAcquired), "{err}");
    assert_eq!(driver.borrowed_count(), 1);

    driver.release_session(&db, &session).unwrap();
    assert_eq!(db.idle_count(), 1);
}

#[test]
fn test_concurrent_borrows() {
    let connect = MockConnect::new();
    let (driver, db) = pool(&connect);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..10 {
                    let session = driver.acquire_session(&db).unwrap();
                    driver.release_session(&db, &session).unwrap();
                }
            });
        }
    });

    assert_eq!(driver.borrowed_count(), 0);
    assert!(connect.connects() <= 4);
    assert_eq!(db.idle_count(), connect.connects());
}

#[test]
fn test_stale_release_leaves_reused_session_alone() {
    let connect = MockConnect::new();
    let (driver, db) = pool(&connect);

    let session = driver.acquire_session(&db).unwrap();
    driver.release_session(&db, &session).unwrap();

    // The same connection now serves an ordinary transaction.
    let tx = db
        .begin_tx(&Context::background(), &Default::default())
        .unwrap();
    assert_eq!(connect.connects(), 1);

    let err = driver.release_session(&db, &session).unwrap_err();
    assert!(matches!(err, Error::NotAcquired), "{err}");
    assert!(!state(&connect.session(0)).closed);
    assert_eq!(state(&connect.session(0)).calls, vec!["begin"]);

    tx.commit().unwrap();
    assert_eq!(state(&connect.session(0)).calls, vec!["begin", "commit"]);
    assert_eq!(db.idle_count(), 1);
}
