//! PostgreSQL implementations of the storage traits. Everything runs on the
//! caller's connection, so a `Transactional::in_transaction` closure sees
//! and commits all of its writes together.

use diesel::pg::PgConnection;
use diesel::Connection;

use amora_shared::errors::{AppError, AppResult};

use super::Transactional;

mod entitlements;
mod feed;
mod moderation;
mod payments;
mod profiles;
mod swipes;

impl Transactional for PgConnection {
    fn in_transaction<T, F>(&mut self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Self) -> AppResult<T>,
    {
        self.transaction::<T, AppError, _>(|conn| f(conn))
    }
}
