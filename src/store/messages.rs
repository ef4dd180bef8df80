use std::collections::{BTreeMap, HashMap};

use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::{
    models::{from_millis, now_millis, parse_id, Message},
    AppError, AppResult,
};

use super::Store;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    room_id: String,
    sender_id: String,
    sender_name: String,
    body: String,
    created_at: i64,
}

impl MessageRow {
    fn into_message(self, read_by: Vec<Uuid>) -> AppResult<Message> {
        Ok(Message {
            id: parse_id(&self.id)?,
            room_id: parse_id(&self.room_id)?,
            sender_id: parse_id(&self.sender_id)?,
            sender_name: self.sender_name,
            body: self.body,
            created_at: from_millis(self.created_at),
            read_by,
        })
    }
}

const SELECT_MESSAGE: &str = r#"
    SELECT m.id, m.room_id, m.sender_id, u.display_name AS sender_name, m.body, m.created_at
    FROM messages m
    JOIN users u ON u.id = m.sender_id
"#;

/// Result of marking a message read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub room_id: Uuid,
    pub message_id: Uuid,
    /// False when the reader had already marked this message.
    pub newly_read: bool,
}

impl Store {
    /// Persists a message. The sender starts out in the reader set.
    pub async fn insert_message(&self, room_id: Uuid, sender_id: Uuid, body: &str) -> AppResult<Message> {
        let id = Uuid::now_v7();
        let created_at = now_millis();

        let mut tx = self.db_pool.begin().await?;
        sqlx::query("INSERT INTO messages (id, room_id, sender_id, body, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(room_id.to_string())
            .bind(sender_id.to_string())
            .bind(body)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(sender_id.to_string())
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.message(id).await
    }

    pub async fn message(&self, message_id: Uuid) -> AppResult<Message> {
        let Some(row) = sqlx::query_as::<_, MessageRow>(&format!("{SELECT_MESSAGE} WHERE m.id = ?"))
            .bind(message_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
        else {
            return Err(AppError::NotFound(format!("message {message_id} not found")));
        };

        let mut readers = self.readers(&[message_id]).await?;
        row.into_message(readers.remove(&message_id).unwrap_or_default())
    }

    /// One page of a room's history in ascending creation order: the newest
    /// `limit` messages, or the newest `limit` older than `before`.
    pub async fn room_messages(&self, room_id: Uuid, limit: i64, before: Option<Uuid>) -> AppResult<Vec<Message>> {
        let rows = match before {
            Some(before) => {
                let cursor: Option<(i64, i64)> =
                    sqlx::query_as("SELECT created_at, seq FROM messages WHERE id = ? AND room_id = ?")
                        .bind(before.to_string())
                        .bind(room_id.to_string())
                        .fetch_optional(&self.db_pool)
                        .await?;
                let Some((created_at, seq)) = cursor else {
                    return Err(AppError::NotFound(format!("message {before} not found in room {room_id}")));
                };

                sqlx::query_as::<_, MessageRow>(&format!(
                    r#"{SELECT_MESSAGE}
                    WHERE m.room_id = ? AND (m.created_at < ? OR (m.created_at = ? AND m.seq < ?))
                    ORDER BY m.created_at DESC, m.seq DESC
                    LIMIT ?"#
                ))
                .bind(room_id.to_string())
                .bind(created_at)
                .bind(created_at)
                .bind(seq)
                .bind(limit)
                .fetch_all(&self.db_pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, MessageRow>(&format!(
                    r#"{SELECT_MESSAGE}
                    WHERE m.room_id = ?
                    ORDER BY m.created_at DESC, m.seq DESC
                    LIMIT ?"#
                ))
                .bind(room_id.to_string())
                .bind(limit)
                .fetch_all(&self.db_pool)
                .await?
            }
        };

        let ids = rows.iter().map(|row| parse_id(&row.id)).collect::<AppResult<Vec<_>>>()?;
        let mut readers = self.readers(&ids).await?;

        let mut messages = rows
            .into_iter()
            .zip(ids)
            .map(|(row, id)| row.into_message(readers.remove(&id).unwrap_or_default()))
            .collect::<AppResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn readers(&self, message_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Vec<Uuid>>> {
        let mut readers: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        if message_ids.is_empty() {
            return Ok(readers);
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT message_id, user_id FROM message_reads WHERE message_id IN (");
        let mut separated = query.separated(", ");
        for id in message_ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(") ORDER BY read_at, user_id");

        let rows: Vec<(String, String)> = query.build_query_as().fetch_all(&self.db_pool).await?;
        for (message_id, user_id) in rows {
            readers.entry(parse_id(&message_id)?).or_default().push(parse_id(&user_id)?);
        }
        Ok(readers)
    }

    /// Adds `user_id` to the message's reader set and moves the member's
    /// last-read marker up to the message. Marking twice changes nothing.
    pub async fn mark_read(&self, message_id: Uuid, user_id: Uuid) -> AppResult<ReadOutcome> {
        let target: Option<(String, i64)> = sqlx::query_as("SELECT room_id, seq FROM messages WHERE id = ?")
            .bind(message_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?;
        let Some((room_id, seq)) = target else {
            return Err(AppError::NotFound(format!("message {message_id} not found")));
        };
        let room_id = parse_id(&room_id)?;
        self.require_member(room_id, user_id).await?;

        let mut tx = self.db_pool.begin().await?;
        let inserted = sqlx::query("INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)")
            .bind(message_id.to_string())
            .bind(user_id.to_string())
            .bind(now_millis())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query(
            r#"
            UPDATE room_members SET last_read_seq = ?
            WHERE room_id = ? AND user_id = ? AND last_read_seq < ?
            "#,
        )
        .bind(seq)
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .bind(seq)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(ReadOutcome { room_id, message_id, newly_read: inserted == 1 })
    }

    /// Per room of `user_id`: messages stored after the member's last-read
    /// marker that the user has not read. Rooms with nothing unread map to 0.
    pub async fn unread_counts(&self, user_id: Uuid) -> AppResult<BTreeMap<Uuid, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT rm.room_id, COUNT(m.id)
            FROM room_members rm
            LEFT JOIN messages m
                ON m.room_id = rm.room_id
                AND m.seq > rm.last_read_seq
                AND NOT EXISTS (
                    SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.user_id = rm.user_id
                )
            WHERE rm.user_id = ?
            GROUP BY rm.room_id
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|(room_id, count)| Ok((parse_id(&room_id)?, count)))
            .collect()
    }
}
