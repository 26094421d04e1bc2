use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    authentication::hash_password_argon2,
    data_formats::{NewUser, ProfileChanges},
    errors::{conflict_on_unique, RequestError},
    models::{Role, User, UserCredentials},
};

use super::{begin_write, find_user, USER_COLUMNS};

pub async fn insert_user(pool: &SqlitePool, user: NewUser, role: Role) -> Result<User, RequestError> {
    if user_exists(pool, &user.email, &user.username, None).await? {
        return Err(RequestError::Conflict("User already exists"));
    }

    let password = hash_password_argon2(user.password).await?;
    let now = Utc::now();
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (username, email, password, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(user.username)
    .bind(user.email)
    .bind(password)
    .bind(role)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| conflict_on_unique(e, "User already exists"))?;

    tracing::info!(user_id = user.id, role = ?user.role, "user registered");
    Ok(user)
}

pub async fn get_credentials_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<UserCredentials>, RequestError> {
    let credentials = sqlx::query_as::<_, UserCredentials>(&format!(
        "SELECT {}, password FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(credentials)
}

/// Case-insensitive match on either email or username, optionally ignoring
/// one user id.
async fn user_exists(
    pool: &SqlitePool,
    email: &str,
    username: &str,
    except: Option<i64>,
) -> Result<bool, RequestError> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM users
        WHERE (email = ? COLLATE NOCASE OR username = ? COLLATE NOCASE)
          AND id != ?
        LIMIT 1
        "#,
    )
    .bind(email)
    .bind(username)
    .bind(except.unwrap_or(0))
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

pub async fn update_user_in_db(
    pool: &SqlitePool,
    id: i64,
    ProfileChanges {
        username,
        email,
        password,
        bio,
        profile_pic,
    }: ProfileChanges,
) -> Result<User, RequestError> {
    if let Some(email) = &email {
        if user_exists(pool, email, "", Some(id)).await? {
            return Err(RequestError::Conflict("Email is already in use"));
        }
    }
    if let Some(username) = &username {
        if user_exists(pool, "", username, Some(id)).await? {
            return Err(RequestError::Conflict("Username is already taken"));
        }
    }

    let password = match password {
        Some(password) => Some(hash_password_argon2(password).await?),
        None => None,
    };

    let mut query = QueryBuilder::<Sqlite>::new("UPDATE users SET ");
    let mut assignments = query.separated(", ");
    assignments.push("updated_at = ").push_bind_unseparated(Utc::now());
    for (column, value) in [
        ("username", username),
        ("email", email),
        ("password", password),
        ("bio", bio),
        ("profile_pic", profile_pic),
    ] {
        if let Some(value) = value {
            assignments
                .push(format!("{} = ", column))
                .push_bind_unseparated(value);
        }
    }
    query.push(" WHERE id = ").push_bind(id);

    let mut tx = begin_write(pool).await?;
    query
        .build()
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "User already exists"))?;
    let user = find_user(&mut tx, id)
        .await?
        .ok_or(RequestError::NotFound("User not found"))?;
    tx.commit().await?;

    tracing::info!(user_id = id, "profile updated");
    Ok(user)
}

pub async fn admin_exists_in_db(pool: &SqlitePool) -> Result<bool, RequestError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(Role::Admin)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Creates the admin account unless one already exists. Returns `None` when
/// nothing was created.
pub async fn create_admin_in_db(
    pool: &SqlitePool,
    admin: NewUser,
) -> Result<Option<User>, RequestError> {
    if admin_exists_in_db(pool).await? {
        tracing::info!("an admin user already exists");
        return Ok(None);
    }
    insert_user(pool, admin, Role::Admin).await.map(Some)
}
