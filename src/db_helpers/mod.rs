use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::{errors::RequestError, models::User};

mod category_helpers;
mod comment_helpers;
mod post_helpers;
mod user_helpers;

pub use category_helpers::*;
pub use comment_helpers::*;
pub use post_helpers::*;
pub use user_helpers::*;

/// Every column of `users` except the password hash.
const USER_COLUMNS: &str =
    "id, username, email, profile_pic, bio, role, created_at, updated_at";

// ----------------- Helper Functions -----------------

/// Opens a transaction holding the write lock from its first statement.
/// A deferred transaction that reads before writing gets SQLITE_BUSY when
/// another connection writes in between.
async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, RequestError> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

pub async fn get_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, RequestError> {
    let mut conn = pool.acquire().await?;
    find_user(&mut conn, id).await
}

async fn find_user(conn: &mut SqliteConnection, id: i64) -> Result<Option<User>, RequestError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(user)
}

async fn users_by_ids(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<HashMap<i64, User>, RequestError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM users WHERE id IN ",
        USER_COLUMNS
    ));
    push_id_list(&mut query, ids);
    let users = query
        .build_query_as::<User>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(users.into_iter().map(|user| (user.id, user)).collect())
}

/// Appends `(?, ?, ...)` binding every id.
fn push_id_list(query: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    query.push("(");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

/// Distinct values in first-seen order.
fn unique_ids(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut unique = Vec::new();
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}

/// Escapes LIKE wildcards so user input only ever matches literally. Pair
/// with `ESCAPE '\'`.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() + 2);
    escaped.push('%');
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// ----------------- End Helper Functions -----------------
