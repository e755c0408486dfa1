//! A driver that records what reached it, for checking that wrappers forward
//! exactly what they are asked to.

use std::cell::{Cell, RefCell};

use sqlprof::driver::{Connection, IsolationLevel, Row, Transaction, Value};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FakeError(pub String);

impl FakeError {
    pub fn new(message: &str) -> Self {
        Self(message.to_string())
    }
}

#[derive(Debug, Default)]
pub struct FakeConnection {
    pub begins: Cell<usize>,
    pub commits: Cell<usize>,
    pub rollbacks: Cell<usize>,
    pub releases: Cell<usize>,
    pub fail_commit: RefCell<Option<FakeError>>,
    pub fail_rollback: RefCell<Option<FakeError>>,
    pub fail_release: RefCell<Option<FakeError>>,
    pub executed: RefCell<Vec<String>>,
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl Connection for FakeConnection {
    type Error = FakeError;
    type Transaction<'c> = FakeTransaction<'c>;

    const DRIVER: &'static str = "fake";

    fn execute(&self, sql: &str, _params: &[Value]) -> Result<usize, FakeError> {
        self.executed.borrow_mut().push(sql.to_string());
        if sql.starts_with("FAIL") {
            return Err(FakeError::new("syntax error"));
        }
        Ok(1)
    }

    fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>, FakeError> {
        self.executed.borrow_mut().push(sql.to_string());
        Ok(vec![vec![Value::Integer(1), Value::from("one")]])
    }

    fn query_scalar(&self, sql: &str, _params: &[Value]) -> Result<Option<Value>, FakeError> {
        self.executed.borrow_mut().push(sql.to_string());
        Ok(Some(Value::Integer(42)))
    }

    fn begin(&self, level: IsolationLevel) -> Result<FakeTransaction<'_>, FakeError> {
        bump(&self.begins);
        Ok(FakeTransaction {
            conn: self,
            level,
            released: false,
        })
    }

    fn close(self) -> Result<(), FakeError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeTransaction<'c> {
    conn: &'c FakeConnection,
    level: IsolationLevel,
    released: bool,
}

impl Transaction for FakeTransaction<'_> {
    type Error = FakeError;
    type Connection = FakeConnection;

    fn connection(&self) -> &FakeConnection {
        self.conn
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.level
    }

    fn commit(&mut self) -> Result<(), FakeError> {
        bump(&self.conn.commits);
        if self.released {
            return Err(FakeError::new("transaction has been disposed"));
        }
        match self.conn.fail_commit.borrow().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn rollback(&mut self) -> Result<(), FakeError> {
        bump(&self.conn.rollbacks);
        if self.released {
            return Err(FakeError::new("transaction has been disposed"));
        }
        match self.conn.fail_rollback.borrow().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn release(&mut self) -> Result<(), FakeError> {
        bump(&self.conn.releases);
        self.released = true;
        match self.conn.fail_release.borrow().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
