//! Client accounts: self-registration, profile edits and staff management.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id, AuthUser},
    error::{not_found, AppError, AppResult},
    models::User,
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub is_staff: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub password: Option<String>,
    pub is_staff: Option<bool>,
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::Validation("A valid email address is required.".into())),
    }
}

fn check_password(password: &str) -> AppResult<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    hash_password(password).map_err(|_| AppError::PasswordHash)
}

fn name(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required.")));
    }
    Ok(value.to_string())
}

/// Public sign-up. The account stays disabled until staff approve it.
pub async fn register(pool: &SqlitePool, mut input: NewUser) -> AppResult<User> {
    input.enabled = false;
    input.is_staff = false;
    insert_user(pool, input).await
}

/// Staff-created account. Only a superuser may create other staff.
pub async fn create_user(pool: &SqlitePool, actor: &AuthUser, input: NewUser) -> AppResult<User> {
    if input.is_staff && !actor.is_superuser {
        return Err(AppError::Forbidden("Only a superuser can create staff accounts."));
    }
    insert_user(pool, input).await
}

async fn insert_user(pool: &SqlitePool, input: NewUser) -> AppResult<User> {
    let user = User {
        id: new_id(),
        email: normalize_email(&input.email)?,
        first_name: name(&input.first_name, "First name")?,
        last_name: name(&input.last_name, "Last name")?,
        phone: input.phone.trim().to_string(),
        birth_date: input.birth_date,
        registered_at: Utc::now(),
        enabled: input.enabled,
        no_show_count: 0,
        is_staff: input.is_staff,
        is_superuser: false,
        password_hash: check_password(&input.password)?,
    };

    let result = sqlx::query(
        r#"INSERT INTO users
           (id, email, first_name, last_name, phone, birth_date, registered_at,
            enabled, no_show_count, is_staff, is_superuser, password_hash)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, 0, ?)"#,
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.phone)
    .bind(user.birth_date)
    .bind(user.registered_at)
    .bind(user.enabled)
    .bind(user.is_staff)
    .bind(&user.password_hash)
    .execute(pool)
    .await;

    if let Err(sqlx::Error::Database(db)) = &result {
        if db.is_unique_violation() {
            return Err(AppError::Validation(
                "An account with that email already exists.".into(),
            ));
        }
    }
    result?;

    log::info!("Account {} registered", user.email);
    Ok(user)
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY last_name, first_name, email")
        .fetch_all(pool)
        .await
}

pub async fn get_user(pool: &SqlitePool, id: &str) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(not_found("user"))
}

/// Fields a client may change on their own account. The birth date stays
/// with staff.
#[derive(Debug, Default, Deserialize)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

pub async fn update_profile(pool: &SqlitePool, user_id: &str, patch: ProfilePatch) -> AppResult<User> {
    let mut user = get_user(pool, user_id).await?;
    if let Some(first_name) = patch.first_name {
        user.first_name = name(&first_name, "First name")?;
    }
    if let Some(last_name) = patch.last_name {
        user.last_name = name(&last_name, "Last name")?;
    }
    if let Some(email) = patch.email {
        user.email = normalize_email(&email)?;
    }
    if let Some(phone) = patch.phone {
        user.phone = phone.trim().to_string();
    }

    let result = sqlx::query(
        "UPDATE users SET first_name = ?, last_name = ?, email = ?, phone = ? WHERE id = ?",
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(&user.id)
    .execute(pool)
    .await;

    if let Err(sqlx::Error::Database(db)) = &result {
        if db.is_unique_violation() {
            return Err(AppError::Validation(
                "An account with that email already exists.".into(),
            ));
        }
    }
    result?;

    log::info!("Account {} updated its profile", user.email);
    Ok(user)
}

/// Staff may manage client and staff accounts; superuser accounts only by a superuser.
pub async fn check_can_manage(pool: &SqlitePool, actor: &AuthUser, id: &str) -> AppResult<()> {
    let user = get_user(pool, id).await?;
    if user.is_superuser && !actor.is_superuser {
        return Err(AppError::Forbidden("Only a superuser can modify a superuser."));
    }
    Ok(())
}

pub async fn update_user(
    pool: &SqlitePool,
    actor: &AuthUser,
    id: &str,
    patch: UserPatch,
) -> AppResult<User> {
    let mut user = get_user(pool, id).await?;

    if let Some(is_staff) = patch.is_staff {
        if is_staff != user.is_staff && !actor.is_superuser {
            return Err(AppError::Forbidden("Only a superuser can change staff access."));
        }
        user.is_staff = is_staff;
    }
    if user.is_superuser && !actor.is_superuser {
        return Err(AppError::Forbidden("Only a superuser can modify a superuser."));
    }
    if let Some(first_name) = patch.first_name {
        user.first_name = name(&first_name, "First name")?;
    }
    if let Some(last_name) = patch.last_name {
        user.last_name = name(&last_name, "Last name")?;
    }
    if let Some(phone) = patch.phone {
        user.phone = phone.trim().to_string();
    }
    if patch.birth_date.is_some() {
        user.birth_date = patch.birth_date;
    }
    if let Some(password) = patch.password {
        user.password_hash = check_password(&password)?;
    }

    sqlx::query(
        r#"UPDATE users SET first_name = ?, last_name = ?, phone = ?, birth_date = ?,
                  is_staff = ?, password_hash = ?
           WHERE id = ?"#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.phone)
    .bind(user.birth_date)
    .bind(user.is_staff)
    .bind(&user.password_hash)
    .bind(&user.id)
    .execute(pool)
    .await?;

    Ok(user)
}

pub async fn delete_user(pool: &SqlitePool, actor: &AuthUser, id: &str) -> AppResult<()> {
    if !actor.is_superuser {
        return Err(AppError::Forbidden("Only a superuser can delete accounts."));
    }
    if actor.id == id {
        return Err(AppError::Validation("You cannot delete your own account.".into()));
    }
    let user = get_user(pool, id).await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user.id)
        .execute(pool)
        .await?;
    log::info!("Account {} deleted by {}", user.email, actor.email);
    Ok(())
}
