use crate::{db, models::User};

use super::Store;

/// A fresh store over an isolated in-memory database.
pub async fn test_store() -> Store {
    let db_pool = db::connect_in_memory()
        .await
        .expect("Failed to create in-memory SQLite pool");
    Store::new(db_pool)
}

pub async fn test_user(store: &Store, username: &str) -> User {
    let display_name = format!("{}{}", username[..1].to_uppercase(), &username[1..]);
    store
        .create_user(username, &display_name, "not-a-real-hash")
        .await
        .expect("Failed to create test user")
}
