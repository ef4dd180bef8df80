use uuid::Uuid;

use crate::{
    models::{from_millis, now_millis, parse_id, User},
    AppError, AppResult,
};

use super::{is_unique_violation, Store};

#[derive(sqlx::FromRow)]
pub(super) struct UserRow {
    pub(super) id: String,
    pub(super) username: String,
    pub(super) display_name: String,
    pub(super) created_at: i64,
}

impl UserRow {
    pub(super) fn into_user(self) -> AppResult<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            username: self.username,
            display_name: self.display_name,
            created_at: from_millis(self.created_at),
            online: None,
        })
    }
}

pub struct Credentials {
    pub user: User,
    pub password_hash: String,
}

impl Store {
    pub async fn create_user(&self, username: &str, display_name: &str, password_hash: &str) -> AppResult<User> {
        let id = Uuid::now_v7();
        let created_at = now_millis();

        let inserted = sqlx::query(
            "INSERT INTO users (id, username, display_name, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(username)
        .bind(display_name)
        .bind(password_hash)
        .bind(created_at)
        .execute(&self.db_pool)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::validation_code(
                    format!("username {username} is taken"),
                    "username_taken",
                ));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %id, username, "created user");
        Ok(User {
            id,
            username: username.to_owned(),
            display_name: display_name.to_owned(),
            created_at: from_millis(created_at),
            online: None,
        })
    }

    pub async fn credentials(&self, username: &str) -> AppResult<Option<Credentials>> {
        let row: Option<(String, String, String, i64, String)> = sqlx::query_as(
            "SELECT id, username, display_name, created_at, password_hash FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.db_pool)
        .await?;

        let Some((id, username, display_name, created_at, password_hash)) = row else {
            return Ok(None);
        };

        Ok(Some(Credentials {
            user: UserRow { id, username, display_name, created_at }.into_user()?,
            password_hash,
        }))
    }

    pub async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT id, username, display_name, created_at FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .map(UserRow::into_user)
            .transpose()
    }

    pub async fn user(&self, user_id: Uuid) -> AppResult<User> {
        self.find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))
    }

    /// Every user except `exclude`, by display name.
    pub async fn list_users(&self, exclude: Uuid) -> AppResult<Vec<User>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, display_name, created_at FROM users WHERE id != ? ORDER BY display_name COLLATE NOCASE, username",
        )
        .bind(exclude.to_string())
        .fetch_all(&self.db_pool)
        .await?
        .into_iter()
        .map(UserRow::into_user)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::store::test_helpers::{test_store, test_user};

    use super::*;

    #[tokio::test]
    async fn create_and_look_up() {
        let store = test_store().await;
        let alice = store.create_user("alice", "Alice", "hash").await.unwrap();

        let found = store.user(alice.id).await.unwrap();
        assert_eq!(found.username, "alice");
        assert_eq!(found.display_name, "Alice");

        let creds = store.credentials("alice").await.unwrap().unwrap();
        assert_eq!(creds.user.id, alice.id);
        assert_eq!(creds.password_hash, "hash");
    }

    #[tokio::test]
    async fn usernames_are_unique_ignoring_case() {
        let store = test_store().await;
        store.create_user("alice", "Alice", "hash").await.unwrap();

        let err = store.create_user("ALICE", "Other", "hash").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { code: Some("username_taken"), .. }));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = test_store().await;
        assert!(store.credentials("nobody").await.unwrap().is_none());
        assert!(matches!(store.user(Uuid::now_v7()).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_excludes_caller() {
        let store = test_store().await;
        let alice = test_user(&store, "alice").await;
        let bob = test_user(&store, "bob").await;
        let carol = test_user(&store, "carol").await;

        let ids: Vec<Uuid> = store.list_users(alice.id).await.unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![bob.id, carol.id]);
    }
}
