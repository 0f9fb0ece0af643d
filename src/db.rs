use std::{fs, path::Path, str::FromStr};

use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqliteConnection, SqlitePool,
};

use crate::{
    auth::{hash_password, new_id},
    config::SuperuserConfig,
    error::{AppError, AppResult},
    models::{AppointmentDetail, Notification, NotificationKind, APPOINTMENT_DETAIL_SELECT},
};

pub async fn connect(db_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut options = SqlitePoolOptions::new().max_connections(max_connections);
    if db_url.contains(":memory:") {
        // Every connection to :memory: is a fresh database; keep the one we have.
        options = options.idle_timeout(None).max_lifetime(None);
    }
    options.connect_with(connect_options).await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Creates the bootstrap superuser unless an account with that email exists.
/// Returns whether a row was inserted.
pub async fn create_superuser(pool: &SqlitePool, config: &SuperuserConfig) -> AppResult<bool> {
    let email = config.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::Validation("SUPERUSER_EMAIL is empty".into()));
    }

    let existing = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE email = ? LIMIT 1")
        .bind(&email)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        log::info!("Superuser {email} already exists");
        return Ok(false);
    }

    if config.password == "admin" {
        log::warn!("SUPERUSER_PASSWORD not set. Using default password 'admin'. Set SUPERUSER_PASSWORD in production.");
    }

    let password_hash = hash_password(&config.password).map_err(|_| AppError::PasswordHash)?;

    sqlx::query(
        r#"INSERT INTO users
           (id, email, first_name, last_name, phone, birth_date, registered_at,
            enabled, no_show_count, is_staff, is_superuser, password_hash)
           VALUES (?, ?, ?, ?, '', NULL, ?, 1, 0, 1, 1, ?)"#,
    )
    .bind(new_id())
    .bind(&email)
    .bind(&config.first_name)
    .bind(&config.last_name)
    .bind(Utc::now())
    .bind(password_hash)
    .execute(pool)
    .await?;

    log::info!("Superuser {email} created");
    Ok(true)
}

pub async fn record_notification(
    conn: &mut SqliteConnection,
    appointment_id: Option<&str>,
    kind: NotificationKind,
    message: &str,
) -> Result<Notification, sqlx::Error> {
    let notification = Notification {
        id: new_id(),
        appointment_id: appointment_id.map(str::to_string),
        kind: kind.as_str().to_string(),
        message: message.to_string(),
        read: false,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"INSERT INTO notifications (id, appointment_id, kind, message, read, created_at)
           VALUES (?, ?, ?, ?, 0, ?)"#,
    )
    .bind(&notification.id)
    .bind(&notification.appointment_id)
    .bind(&notification.kind)
    .bind(&notification.message)
    .bind(notification.created_at)
    .execute(conn)
    .await?;

    Ok(notification)
}

pub async fn fetch_appointment_detail(
    pool: &SqlitePool,
    appointment_id: &str,
) -> Result<Option<AppointmentDetail>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentDetail>(&format!(
        "{APPOINTMENT_DETAIL_SELECT} WHERE a.id = ? LIMIT 1"
    ))
    .bind(appointment_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_notifications(
    pool: &SqlitePool,
    unread_only: bool,
    limit: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    let query = if unread_only {
        "SELECT * FROM notifications WHERE read = 0 ORDER BY created_at DESC LIMIT ?"
    } else {
        "SELECT * FROM notifications ORDER BY created_at DESC LIMIT ?"
    };
    sqlx::query_as::<_, Notification>(query)
        .bind(limit)
        .fetch_all(pool)
        .await
}

pub async fn mark_notification_read(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_all_notifications_read(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE read = 0")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
