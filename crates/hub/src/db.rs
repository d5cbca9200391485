use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;
use time::OffsetDateTime;

use crate::notify::{Category, NotificationSeverity};
use crate::status::SensorReading;

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plant {
    pub plant_id: i64,
    pub name: Option<String>,
    pub plant_type: Option<String>,
    pub user_id: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPlant {
    pub name: Option<String>,
    pub plant_type: Option<String>,
    pub user_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub plant_id: i64,
    pub user_id: i64,
    pub ts: i64,
    pub category: Category,
    pub severity: NotificationSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationRecord {
    pub notification_id: i64,
    pub plant_id: i64,
    pub user_id: i64,
    pub ts: i64,
    pub category: Category,
    pub severity: NotificationSeverity,
    pub message: String,
    pub is_read: bool,
}

#[derive(FromRow)]
struct NotificationRow {
    notification_id: i64,
    plant_id: i64,
    user_id: i64,
    ts: i64,
    category: String,
    severity: String,
    message: String,
    is_read: bool,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = anyhow::Error;

    fn try_from(r: NotificationRow) -> Result<Self> {
        Ok(Self {
            notification_id: r.notification_id,
            plant_id: r.plant_id,
            user_id: r.user_id,
            ts: r.ts,
            category: r.category.parse::<Category>().with_context(|| {
                format!("notification {} has a bad category", r.notification_id)
            })?,
            severity: r.severity.parse::<NotificationSeverity>().with_context(|| {
                format!("notification {} has a bad severity", r.notification_id)
            })?,
            message: r.message,
            is_read: r.is_read,
        })
    }
}

#[derive(FromRow)]
struct ReadingRow {
    ts: i64,
    temperature: f64,
    soil_moisture: f64,
    air_humidity: f64,
}

impl From<ReadingRow> for SensorReading {
    fn from(r: ReadingRow) -> Self {
        SensorReading::new(r.ts, r.temperature, r.soil_moisture, r.air_humidity)
    }
}

const NOTIFICATION_COLUMNS: &str =
    "notification_id, plant_id, user_id, ts, category, severity, message, is_read";

/// Plant names are unique per user under this key.
pub fn plant_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl Db {
    /// db_url examples:
    /// - "sqlite:/var/lib/plant-hub/plants.db"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        // Every connection to ":memory:" is its own database, so pin the
        // pool to a single long-lived connection.
        let pool_options = if db_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    /// Close the pool.  Every later call fails.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ----------------------------
    // Users
    // ----------------------------

    pub async fn upsert_user(&self, user_id: i64, username: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
              username=excluded.username
            "#,
        )
        .bind(user_id)
        .bind(username)
        .bind(now_unix())
        .execute(&self.pool)
        .await
        .context("upsert_user failed")?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str) -> Result<User> {
        let created_at = now_unix();
        let user_id = sqlx::query("INSERT INTO users (username, created_at) VALUES (?, ?)")
            .bind(username)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .context("create_user failed")?
            .last_insert_rowid();

        Ok(User {
            user_id,
            username: username.to_string(),
            created_at,
        })
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT user_id, username, created_at FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("get_user failed")
    }

    // ----------------------------
    // Plants
    // ----------------------------

    pub async fn upsert_plant(&self, plant_id: i64, p: &NewPlant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO plants (plant_id, name, plant_type, user_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(plant_id) DO UPDATE SET
              name=excluded.name,
              plant_type=excluded.plant_type,
              user_id=excluded.user_id
            "#,
        )
        .bind(plant_id)
        .bind(&p.name)
        .bind(&p.plant_type)
        .bind(p.user_id)
        .bind(now_unix())
        .execute(&self.pool)
        .await
        .context("upsert_plant failed")?;
        Ok(())
    }

    pub async fn create_plant(&self, p: &NewPlant) -> Result<Plant> {
        let created_at = now_unix();
        let plant_id = sqlx::query(
            "INSERT INTO plants (name, plant_type, user_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&p.name)
        .bind(&p.plant_type)
        .bind(p.user_id)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("create_plant failed")?
        .last_insert_rowid();

        Ok(Plant {
            plant_id,
            name: p.name.clone(),
            plant_type: p.plant_type.clone(),
            user_id: p.user_id,
            created_at,
        })
    }

    pub async fn get_plant(&self, plant_id: i64) -> Result<Option<Plant>> {
        sqlx::query_as::<_, Plant>(
            "SELECT plant_id, name, plant_type, user_id, created_at FROM plants WHERE plant_id = ?",
        )
        .bind(plant_id)
        .fetch_optional(&self.pool)
        .await
        .context("get_plant failed")
    }

    pub async fn list_plants(&self) -> Result<Vec<Plant>> {
        sqlx::query_as::<_, Plant>(
            "SELECT plant_id, name, plant_type, user_id, created_at FROM plants ORDER BY plant_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("list_plants failed")
    }

    pub async fn list_plant_ids(&self) -> Result<Vec<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT plant_id FROM plants ORDER BY plant_id")
            .fetch_all(&self.pool)
            .await
            .context("list_plant_ids failed")
    }

    /// Whether `user_id` already owns a plant whose name matches `name`,
    /// ignoring case and surrounding whitespace.
    pub async fn plant_name_taken(&self, user_id: i64, name: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM plants WHERE user_id = ? AND lower(trim(name)) = lower(trim(?)))",
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .context("plant_name_taken failed")
    }

    /// Deletes the plant together with its logs and notifications.  Returns
    /// false if the plant did not exist.
    pub async fn delete_plant(&self, plant_id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM plants WHERE plant_id = ?")
            .bind(plant_id)
            .execute(&self.pool)
            .await
            .context("delete_plant failed")?;
        Ok(res.rows_affected() > 0)
    }

    // ----------------------------
    // Sensor log
    // ----------------------------

    pub async fn insert_reading(&self, plant_id: i64, r: &SensorReading) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO plant_logs (plant_id, ts, temperature, soil_moisture, air_humidity)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(plant_id)
        .bind(r.ts)
        .bind(r.temperature)
        .bind(r.soil_moisture)
        .bind(r.air_humidity)
        .execute(&self.pool)
        .await
        .context("insert_reading failed")?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn latest_reading(&self, plant_id: i64) -> Result<Option<SensorReading>> {
        let row = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT ts, temperature, soil_moisture, air_humidity
            FROM plant_logs
            WHERE plant_id = ?
            ORDER BY ts DESC, log_id DESC
            LIMIT 1
            "#,
        )
        .bind(plant_id)
        .fetch_optional(&self.pool)
        .await
        .context("latest_reading failed")?;
        Ok(row.map(Into::into))
    }

    /// Newest first.
    pub async fn recent_readings(&self, plant_id: i64, limit: i64) -> Result<Vec<SensorReading>> {
        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT ts, temperature, soil_moisture, air_humidity
            FROM plant_logs
            WHERE plant_id = ?
            ORDER BY ts DESC, log_id DESC
            LIMIT ?
            "#,
        )
        .bind(plant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("recent_readings failed")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // ----------------------------
    // Notifications
    // ----------------------------

    pub async fn insert_notification(&self, n: &NewNotification) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO notifications (plant_id, user_id, ts, category, severity, message, is_read)
            VALUES (?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(n.plant_id)
        .bind(n.user_id)
        .bind(n.ts)
        .bind(n.category.as_str())
        .bind(n.severity.as_str())
        .bind(&n.message)
        .execute(&self.pool)
        .await
        .context("insert_notification failed")?
        .last_insert_rowid();
        Ok(id)
    }

    /// Returns false if no such notification exists.
    pub async fn mark_notification_read(&self, notification_id: i64) -> Result<bool> {
        let res = sqlx::query("UPDATE notifications SET is_read = 1 WHERE notification_id = ?")
            .bind(notification_id)
            .execute(&self.pool)
            .await
            .context("mark_notification_read failed")?;
        Ok(res.rows_affected() > 0)
    }

    /// Newest first.
    pub async fn notifications_for_user(&self, user_id: i64) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = ? ORDER BY ts DESC, notification_id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("notifications_for_user failed")?;
        rows.into_iter().map(NotificationRecord::try_from).collect()
    }

    pub async fn notifications_for_plant(&self, plant_id: i64) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE plant_id = ? ORDER BY ts DESC, notification_id DESC"
        ))
        .bind(plant_id)
        .fetch_all(&self.pool)
        .await
        .context("notifications_for_plant failed")?;
        rows.into_iter().map(NotificationRecord::try_from).collect()
    }

    pub async fn latest_notification(&self) -> Result<Option<NotificationRecord>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             ORDER BY ts DESC, notification_id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .context("latest_notification failed")?;
        row.map(NotificationRecord::try_from).transpose()
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("unread_count failed")
    }
}

// ===========================================================================
// Tests
// ===========================================================================
