use std::collections::HashMap;

use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use crate::{
    models::{from_millis, now_millis, parse_id, Room, RoomKind, User},
    AppError, AppResult,
};

use super::{users::UserRow, Store};

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: String,
    kind: String,
    name: Option<String>,
    created_by: String,
    created_at: i64,
}

impl RoomRow {
    fn into_room(self, participants: Vec<Uuid>) -> AppResult<Room> {
        Ok(Room {
            id: parse_id(&self.id)?,
            kind: self.kind.parse()?,
            name: self.name,
            participants,
            created_by: parse_id(&self.created_by)?,
            created_at: from_millis(self.created_at),
        })
    }
}

/// Order-independent key for a pair of users.
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

async fn insert_member(
    tx: &mut Transaction<'_, Sqlite>,
    room_id: Uuid,
    user_id: Uuid,
    position: i64,
    joined_at: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO room_members (room_id, user_id, position, joined_at) VALUES (?, ?, ?, ?)")
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .bind(position)
        .bind(joined_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

impl Store {
    pub async fn room(&self, room_id: Uuid) -> AppResult<Room> {
        let Some(row) = sqlx::query_as::<_, RoomRow>(
            "SELECT id, kind, name, created_by, created_at FROM rooms WHERE id = ?",
        )
        .bind(room_id.to_string())
        .fetch_optional(&self.db_pool)
        .await?
        else {
            return Err(AppError::NotFound(format!("room {room_id} not found")));
        };

        let participants = self.participant_ids(room_id).await?;
        row.into_room(participants)
    }

    /// Rooms `user_id` belongs to, newest first.
    pub async fn rooms_for(&self, user_id: Uuid) -> AppResult<Vec<Room>> {
        let rows = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT r.id, r.kind, r.name, r.created_by, r.created_at
            FROM rooms r
            JOIN room_members m ON m.room_id = r.id
            WHERE m.user_id = ?
            ORDER BY r.created_at DESC, r.id DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.db_pool)
        .await?;

        let members: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT room_id, user_id FROM room_members
            WHERE room_id IN (SELECT room_id FROM room_members WHERE user_id = ?)
            ORDER BY room_id, position
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.db_pool)
        .await?;

        let mut participants: HashMap<String, Vec<Uuid>> = HashMap::new();
        for (room_id, member_id) in members {
            participants.entry(room_id).or_default().push(parse_id(&member_id)?);
        }

        rows.into_iter()
            .map(|row| {
                let members = participants.remove(&row.id).unwrap_or_default();
                row.into_room(members)
            })
            .collect()
    }

    pub async fn room_ids_for(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids: Vec<(String,)> = sqlx::query_as("SELECT room_id FROM room_members WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_all(&self.db_pool)
            .await?;
        ids.iter().map(|(id,)| parse_id(id)).collect()
    }

    pub async fn is_member(&self, room_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        Ok(sqlx::query("SELECT 1 FROM room_members WHERE room_id = ? AND user_id = ?")
            .bind(room_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .is_some())
    }

    /// `NotFound` for a missing room, `Forbidden` for a non-member.
    pub async fn require_member(&self, room_id: Uuid, user_id: Uuid) -> AppResult<()> {
        if self.is_member(room_id, user_id).await? {
            return Ok(());
        }
        let exists = sqlx::query("SELECT 1 FROM rooms WHERE id = ?")
            .bind(room_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .is_some();
        if exists {
            Err(AppError::Forbidden(format!("not a member of room {room_id}")))
        } else {
            Err(AppError::NotFound(format!("room {room_id} not found")))
        }
    }

    async fn participant_ids(&self, room_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids: Vec<(String,)> =
            sqlx::query_as("SELECT user_id FROM room_members WHERE room_id = ? ORDER BY position")
                .bind(room_id.to_string())
                .fetch_all(&self.db_pool)
                .await?;
        ids.iter().map(|(id,)| parse_id(id)).collect()
    }

    pub async fn participants(&self, room_id: Uuid) -> AppResult<Vec<User>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.username, u.display_name, u.created_at
            FROM room_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.room_id = ?
            ORDER BY m.position
            "#,
        )
        .bind(room_id.to_string())
        .fetch_all(&self.db_pool)
        .await?
        .into_iter()
        .map(UserRow::into_user)
        .collect()
    }

    /// Creates a group room. The creator is always the first participant and
    /// duplicate participants collapse into one membership.
    pub async fn create_group_room(&self, creator: Uuid, name: &str, participants: &[Uuid]) -> AppResult<Room> {
        let mut members = vec![creator];
        for id in participants {
            if !members.contains(id) {
                members.push(*id);
            }
        }

        for id in &members {
            if self.find_user(*id).await?.is_none() {
                return Err(AppError::NotFound(format!("user {id} not found")));
            }
        }

        let room_id = Uuid::now_v7();
        let created_at = now_millis();

        let mut tx = self.db_pool.begin().await?;
        sqlx::query("INSERT INTO rooms (id, kind, name, created_by, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(room_id.to_string())
            .bind(RoomKind::Group.as_str())
            .bind(name)
            .bind(creator.to_string())
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        for (position, member) in members.iter().enumerate() {
            insert_member(&mut tx, room_id, *member, position as i64, created_at).await?;
        }
        tx.commit().await?;

        tracing::info!(%room_id, %creator, members = members.len(), "created group room");
        Ok(Room {
            id: room_id,
            kind: RoomKind::Group,
            name: Some(name.to_owned()),
            participants: members,
            created_by: creator,
            created_at: from_millis(created_at),
        })
    }

    /// Returns the private room for the unordered pair `{a, b}`, creating it
    /// on first use. Concurrent callers race on the `pair_key` constraint;
    /// the loser's insert is ignored and both read back the same row.
    pub async fn private_room(&self, a: Uuid, b: Uuid) -> AppResult<Room> {
        if a == b {
            return Err(AppError::validation("cannot open a private room with yourself"));
        }
        self.user(b).await?;

        let key = pair_key(a, b);
        if let Some(room_id) = self.private_room_id(&key).await? {
            return self.room(room_id).await;
        }

        let room_id = Uuid::now_v7();
        let created_at = now_millis();

        let mut tx = self.db_pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO rooms (id, kind, name, pair_key, created_by, created_at) VALUES (?, ?, NULL, ?, ?, ?)",
        )
        .bind(room_id.to_string())
        .bind(RoomKind::Private.as_str())
        .bind(&key)
        .bind(a.to_string())
        .bind(created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 1 {
            insert_member(&mut tx, room_id, a, 0, created_at).await?;
            insert_member(&mut tx, room_id, b, 1, created_at).await?;
        }
        tx.commit().await?;

        if inserted == 1 {
            tracing::info!(%room_id, pair = %key, "created private room");
        }

        let room_id = self
            .private_room_id(&key)
            .await?
            .ok_or_else(|| anyhow::anyhow!("private room {key} vanished after insert"))?;
        self.room(room_id).await
    }

    async fn private_room_id(&self, key: &str) -> AppResult<Option<Uuid>> {
        let id: Option<(String,)> = sqlx::query_as("SELECT id FROM rooms WHERE pair_key = ?")
            .bind(key)
            .fetch_optional(&self.db_pool)
            .await?;
        id.map(|(id,)| parse_id(&id)).transpose()
    }

    /// Adds `user_id` to a group room. Returns the room and whether the
    /// membership is new; joining twice is a no-op.
    pub async fn join_room(&self, room_id: Uuid, user_id: Uuid) -> AppResult<(Room, bool)> {
        let room = self.room(room_id).await?;
        if room.participants.contains(&user_id) {
            return Ok((room, false));
        }
        if room.kind == RoomKind::Private {
            return Err(AppError::Forbidden("private rooms cannot be joined".to_owned()));
        }

        let joined = sqlx::query(
            r#"
            INSERT OR IGNORE INTO room_members (room_id, user_id, position, joined_at)
            SELECT ?, ?, COALESCE(MAX(position), -1) + 1, ? FROM room_members WHERE room_id = ?
            "#,
        )
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .bind(now_millis())
        .bind(room_id.to_string())
        .execute(&self.db_pool)
        .await?
        .rows_affected()
            == 1;

        Ok((self.room(room_id).await?, joined))
    }
}
