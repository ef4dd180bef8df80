//! Persistence for users, rooms and messages.
//!
//! Everything that has to hold under concurrent requests is a constraint in
//! the schema (see `db.rs`), never an in-process lock.

mod messages;
mod rooms;
mod users;

#[cfg(test)]
pub(crate) mod test_helpers;

use sqlx::SqlitePool;

pub use messages::ReadOutcome;
pub use users::Credentials;

#[derive(Clone)]
pub struct Store {
    db_pool: SqlitePool,
}

impl Store {
    pub fn new(db_pool: SqlitePool) -> Store {
        Store { db_pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db_pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
