use sqlx::{migrate::MigrateDatabase, sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow}, Sqlite, Row};
use chrono::{DateTime, Utc};
use crate::error::{BotError, BotResult};
use crate::models::{ChatEvent, Poll, PollVote, SavedVoice, StoredUser, UserTopic, VoteOption, VoteOutcome};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> BotResult<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// A private in-memory database. It uses one connection that never expires,
    /// since every new `:memory:` connection would open an empty database.
    #[cfg(test)]
    pub async fn in_memory() -> BotResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> BotResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                username TEXT NOT NULL DEFAULT ''
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_topic (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                topic TEXT NOT NULL,
                UNIQUE(chat_id, user_id, topic)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS event (
                id INTEGER PRIMARY KEY,
                chat_id INTEGER NOT NULL,
                msg_id INTEGER NOT NULL,
                time TEXT NOT NULL,
                name TEXT NOT NULL,
                UNIQUE(chat_id, msg_id, name)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll (
                id TEXT PRIMARY KEY,
                chat_id INTEGER NOT NULL,
                topic TEXT NOT NULL,
                result_message_id INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_vote (
                poll_id TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                vote INTEGER NOT NULL,
                PRIMARY KEY (poll_id, user_id),
                FOREIGN KEY (poll_id) REFERENCES poll(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS voice (
                file_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // --- Users and topics ---

    pub async fn save_user(&self, user: &StoredUser) -> BotResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, username)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET first_name = excluded.first_name, username = excluded.username
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.username)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn exists_chat_topic(&self, chat_id: i64, topic: &str) -> BotResult<bool> {
        let exists = sqlx::query("SELECT 1 FROM user_topic WHERE chat_id = ? AND topic = ? LIMIT 1")
            .bind(chat_id)
            .bind(topic)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        Ok(exists)
    }

    /// Returns false when the user was already subscribed.
    pub async fn save_user_topic(&self, chat_id: i64, user_id: i64, topic: &str) -> BotResult<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO user_topic (chat_id, user_id, topic)
            VALUES (?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(topic)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    pub async fn delete_user_topic(&self, chat_id: i64, user_id: i64, topic: &str) -> BotResult<u64> {
        let deleted = sqlx::query("DELETE FROM user_topic WHERE chat_id = ? AND user_id = ? AND topic = ?")
            .bind(chat_id)
            .bind(user_id)
            .bind(topic)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    // Topics a user follows in a chat, with the subscriber count of each
    pub async fn find_user_chat_topics(&self, chat_id: i64, user_id: i64) -> BotResult<Vec<UserTopic>> {
        let rows = sqlx::query(
            r#"
            SELECT ut.chat_id, ut.user_id, ut.topic,
                   (SELECT COUNT(*) FROM user_topic WHERE chat_id = ut.chat_id AND topic = ut.topic) AS subscribers
            FROM user_topic ut
            WHERE ut.chat_id = ? AND ut.user_id = ?
            ORDER BY ut.id
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(topic_from_row).collect())
    }

    pub async fn find_chat_topics(&self, chat_id: i64) -> BotResult<Vec<UserTopic>> {
        let rows = sqlx::query(
            r#"
            SELECT chat_id, 0 AS user_id, topic, COUNT(*) AS subscribers
            FROM user_topic
            WHERE chat_id = ?
            GROUP BY chat_id, topic
            ORDER BY subscribers DESC, topic
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(topic_from_row).collect())
    }

    /// Subscribers of a topic in subscription order.
    pub async fn find_users_by_topic(&self, chat_id: i64, topic: &str) -> BotResult<Vec<StoredUser>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.first_name, u.username
            FROM users u
            JOIN user_topic ut ON u.id = ut.user_id
            WHERE ut.chat_id = ? AND ut.topic = ?
            ORDER BY ut.id
            "#,
        )
        .bind(chat_id)
        .bind(topic)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    // --- Events ---

    pub async fn save_chat_event(&self, event: &ChatEvent) -> BotResult<()> {
        sqlx::query(
            r#"
            INSERT INTO event (chat_id, msg_id, time, name)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chat_id, msg_id, name) DO UPDATE SET time = excluded.time
            "#,
        )
        .bind(event.chat_id)
        .bind(event.msg_id)
        .bind(event.time.to_rfc3339())
        .bind(&event.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent occurrence first.
    pub async fn find_chat_events_by_name(&self, chat_id: i64, name: &str) -> BotResult<Vec<ChatEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT chat_id, msg_id, time, name
            FROM event
            WHERE chat_id = ? AND name = ?
            ORDER BY time DESC
            "#,
        )
        .bind(chat_id)
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> BotResult<ChatEvent> {
                let time_str = row.get::<String, _>("time");
                let time = DateTime::parse_from_rfc3339(&time_str)
                    .map_err(|e| BotError::Invalid(format!("Failed to parse event time: {}", e)))?
                    .with_timezone(&Utc);
                Ok(ChatEvent {
                    chat_id: row.get("chat_id"),
                    msg_id: row.get("msg_id"),
                    time,
                    name: row.get("name"),
                })
            })
            .collect()
    }

    pub async fn delete_chat_event(&self, chat_id: i64, msg_id: i64, name: &str) -> BotResult<u64> {
        let deleted = sqlx::query("DELETE FROM event WHERE chat_id = ? AND msg_id = ? AND name = ?")
            .bind(chat_id)
            .bind(msg_id)
            .bind(name)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    // --- Polls ---

    pub async fn save_poll(&self, poll: &Poll) -> BotResult<()> {
        sqlx::query(
            r#"
            INSERT INTO poll (id, chat_id, topic, result_message_id)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET result_message_id = excluded.result_message_id
            "#,
        )
        .bind(&poll.id)
        .bind(poll.chat_id)
        .bind(&poll.topic)
        .bind(poll.result_message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_poll(&self, poll_id: &str) -> BotResult<Option<Poll>> {
        let row = sqlx::query("SELECT id, chat_id, topic, result_message_id FROM poll WHERE id = ?")
            .bind(poll_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| poll_from_row(&row)))
    }

    /// Resolves the poll whose tally is displayed by the given message.
    pub async fn find_poll_by_message(&self, chat_id: i64, message_id: i64) -> BotResult<Option<Poll>> {
        let row = sqlx::query(
            "SELECT id, chat_id, topic, result_message_id FROM poll WHERE chat_id = ? AND result_message_id = ?",
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| poll_from_row(&row)))
    }

    // --- Votes ---

    #[cfg(test)]
    pub async fn find_poll_vote(&self, poll_id: &str, user_id: i64) -> BotResult<Option<PollVote>> {
        let row = sqlx::query("SELECT poll_id, user_id, vote FROM poll_vote WHERE poll_id = ? AND user_id = ?")
            .bind(poll_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| vote_from_row(&row)).transpose()
    }

    pub async fn find_poll_votes(&self, poll_id: &str) -> BotResult<Vec<PollVote>> {
        let rows = sqlx::query("SELECT poll_id, user_id, vote FROM poll_vote WHERE poll_id = ?")
            .bind(poll_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(vote_from_row).collect()
    }

    // Insert or replace in place, keyed on (poll_id, user_id)
    #[cfg(test)]
    pub async fn save_poll_vote(&self, vote: &PollVote) -> BotResult<()> {
        sqlx::query(
            r#"
            INSERT INTO poll_vote (poll_id, user_id, vote)
            VALUES (?, ?, ?)
            ON CONFLICT(poll_id, user_id) DO UPDATE SET vote = excluded.vote
            "#,
        )
        .bind(&vote.poll_id)
        .bind(vote.user_id)
        .bind(vote.vote.index())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_poll_vote(&self, poll_id: &str, user_id: i64) -> BotResult<u64> {
        let deleted = sqlx::query("DELETE FROM poll_vote WHERE poll_id = ? AND user_id = ?")
            .bind(poll_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    /// Applies a vote with toggle semantics inside one write transaction.
    ///
    /// The transaction opens with the conditional delete, so SQLite takes the
    /// write lock before anything is read. Two submissions for the same key are
    /// therefore serialized and never interleave their read and write.
    pub async fn toggle_poll_vote(&self, poll_id: &str, user_id: i64, vote: VoteOption) -> BotResult<VoteOutcome> {
        let mut tx = self.pool.begin().await?;

        let retracted = sqlx::query("DELETE FROM poll_vote WHERE poll_id = ? AND user_id = ? AND vote = ?")
            .bind(poll_id)
            .bind(user_id)
            .bind(vote.index())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if retracted > 0 {
            tx.commit().await?;
            return Ok(VoteOutcome::Retracted);
        }

        let previous = sqlx::query("SELECT vote FROM poll_vote WHERE poll_id = ? AND user_id = ?")
            .bind(poll_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO poll_vote (poll_id, user_id, vote)
            VALUES (?, ?, ?)
            ON CONFLICT(poll_id, user_id) DO UPDATE SET vote = excluded.vote
            "#,
        )
        .bind(poll_id)
        .bind(user_id)
        .bind(vote.index())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(if previous.is_some() { VoteOutcome::Changed } else { VoteOutcome::Cast })
    }

    // --- Voices ---

    pub async fn save_voice(&self, voice: &SavedVoice) -> BotResult<()> {
        sqlx::query("INSERT INTO voice (file_id, user_id) VALUES (?, ?) ON CONFLICT DO NOTHING")
            .bind(&voice.file_id)
            .bind(voice.user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_random_voice(&self) -> BotResult<Option<SavedVoice>> {
        let row = sqlx::query("SELECT file_id, user_id FROM voice ORDER BY RANDOM() LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| SavedVoice {
            file_id: row.get("file_id"),
            user_id: row.get("user_id"),
        }))
    }
}

fn user_from_row(row: &SqliteRow) -> StoredUser {
    StoredUser {
        id: row.get("id"),
        first_name: row.get("first_name"),
        username: row.get("username"),
    }
}

fn topic_from_row(row: &SqliteRow) -> UserTopic {
    UserTopic {
        chat_id: row.get("chat_id"),
        user_id: row.get("user_id"),
        topic: row.get("topic"),
        subscribers: row.get("subscribers"),
    }
}

fn poll_from_row(row: &SqliteRow) -> Poll {
    Poll {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        topic: row.get("topic"),
        result_message_id: row.get("result_message_id"),
    }
}

fn vote_from_row(row: &SqliteRow) -> BotResult<PollVote> {
    let index = row.get::<i64, _>("vote");
    let vote = VoteOption::from_index(index)
        .ok_or_else(|| BotError::Invalid(format!("Unknown vote option: {}", index)))?;
    Ok(PollVote {
        poll_id: row.get("poll_id"),
        user_id: row.get("user_id"),
        vote,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, name: &str) -> StoredUser {
        StoredUser { id, first_name: name.to_string(), username: String::new() }
    }

    #[tokio::test]
    async fn subscribers_come_back_in_subscription_order() {
        let db = Database::in_memory().await.unwrap();
        for (id, name) in [(3, "Caio"), (1, "Ana"), (2, "Bia")] {
            db.save_user(&user(id, name)).await.unwrap();
            assert!(db.save_user_topic(-10, id, "futebol").await.unwrap());
        }
        assert!(!db.save_user_topic(-10, 1, "futebol").await.unwrap());

        let ids: Vec<i64> = db.find_users_by_topic(-10, "futebol").await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert!(db.find_users_by_topic(-11, "futebol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn topic_counts_per_chat_and_user() {
        let db = Database::in_memory().await.unwrap();
        db.save_user(&user(1, "Ana")).await.unwrap();
        db.save_user(&user(2, "Bia")).await.unwrap();
        db.save_user_topic(-10, 1, "futebol").await.unwrap();
        db.save_user_topic(-10, 2, "futebol").await.unwrap();
        db.save_user_topic(-10, 2, "cinema").await.unwrap();

        let chat = db.find_chat_topics(-10).await.unwrap();
        assert_eq!(chat[0].topic, "futebol");
        assert_eq!(chat[0].subscribers, 2);
        assert_eq!(chat[1].subscribers, 1);

        let mine = db.find_user_chat_topics(-10, 2).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].subscribers, 2);

        assert!(db.exists_chat_topic(-10, "cinema").await.unwrap());
        assert_eq!(db.delete_user_topic(-10, 2, "cinema").await.unwrap(), 1);
        assert!(!db.exists_chat_topic(-10, "cinema").await.unwrap());
    }

    #[tokio::test]
    async fn missing_rows_are_absent_not_errors() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.find_poll("nope").await.unwrap().is_none());
        assert!(db.find_poll_by_message(-10, 99).await.unwrap().is_none());
        assert!(db.find_poll_vote("nope", 1).await.unwrap().is_none());
        assert!(db.find_random_voice().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn toggle_reports_each_transition() {
        let db = Database::in_memory().await.unwrap();
        db.save_poll(&Poll { id: "p".into(), chat_id: -10, topic: "t".into(), result_message_id: 50 })
            .await
            .unwrap();

        assert_eq!(db.toggle_poll_vote("p", 1, VoteOption::Yes).await.unwrap(), VoteOutcome::Cast);
        assert_eq!(db.toggle_poll_vote("p", 1, VoteOption::No).await.unwrap(), VoteOutcome::Changed);
        assert_eq!(db.find_poll_vote("p", 1).await.unwrap().unwrap().vote, VoteOption::No);
        assert_eq!(db.toggle_poll_vote("p", 1, VoteOption::No).await.unwrap(), VoteOutcome::Retracted);
        assert!(db.find_poll_vote("p", 1).await.unwrap().is_none());

        let poll = db.find_poll_by_message(-10, 50).await.unwrap().unwrap();
        assert_eq!(poll.id, "p");
    }

    #[tokio::test]
    async fn vote_upsert_replaces_in_place() {
        let db = Database::in_memory().await.unwrap();
        db.save_poll(&Poll { id: "p".into(), chat_id: -10, topic: "t".into(), result_message_id: 50 })
            .await
            .unwrap();

        for vote in [VoteOption::Yes, VoteOption::No] {
            db.save_poll_vote(&PollVote { poll_id: "p".into(), user_id: 1, vote }).await.unwrap();
        }
        let votes = db.find_poll_votes("p").await.unwrap();
        assert_eq!(votes, vec![PollVote { poll_id: "p".into(), user_id: 1, vote: VoteOption::No }]);

        assert_eq!(db.delete_poll_vote("p", 1).await.unwrap(), 1);
        assert_eq!(db.delete_poll_vote("p", 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn events_are_listed_newest_first() {
        let db = Database::in_memory().await.unwrap();
        let older = DateTime::parse_from_rfc3339("2024-01-01T10:00:00Z").unwrap().with_timezone(&Utc);
        let newer = DateTime::parse_from_rfc3339("2024-02-01T10:00:00Z").unwrap().with_timezone(&Utc);
        for (msg_id, time) in [(1, older), (2, newer)] {
            db.save_chat_event(&ChatEvent { chat_id: -10, msg_id, time, name: "cafe".into() })
                .await
                .unwrap();
        }

        let events = db.find_chat_events_by_name(-10, "cafe").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].msg_id, 2);
        assert_eq!(events[0].time, newer);

        assert_eq!(db.delete_chat_event(-10, 2, "cafe").await.unwrap(), 1);
        assert_eq!(db.find_chat_events_by_name(-10, "cafe").await.unwrap().len(), 1);
    }
}
