use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::{
    data_formats::{CategoryChanges, NewCategory, PageRequest},
    errors::{conflict_on_unique, RequestError},
    models::Category,
};

use super::{begin_write, escape_like};

static SLUG_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("slug shape pattern is valid"));

fn push_search(query: &mut QueryBuilder<'_, Sqlite>, search: Option<&str>) {
    if let Some(search) = search {
        let pattern = escape_like(search);
        query
            .push(" WHERE name LIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\' OR description LIKE ")
            .push_bind(pattern)
            .push(r" ESCAPE '\'");
    }
}

pub async fn list_categories_in_db(
    pool: &SqlitePool,
    search: Option<&str>,
    page: PageRequest,
) -> Result<(Vec<Category>, i64), RequestError> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM categories");
    push_search(&mut count, search);
    let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM categories");
    push_search(&mut query, search);
    query
        .push(" ORDER BY name COLLATE NOCASE ASC, id ASC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let categories = query
        .build_query_as::<Category>()
        .fetch_all(pool)
        .await?;

    Ok((categories, total))
}

pub async fn create_category_in_db(
    pool: &SqlitePool,
    NewCategory {
        name,
        description,
        slug,
    }: NewCategory,
) -> Result<Category, RequestError> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM categories WHERE name = ? COLLATE NOCASE OR slug = ?")
            .bind(&name)
            .bind(&slug)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Err(RequestError::Conflict("Category already exists"));
    }

    let now = Utc::now();
    let category = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name, description, slug, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(slug)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Category already exists"))?;

    tracing::info!(category_id = category.id, slug = %category.slug, "category created");
    Ok(category)
}

pub(crate) async fn find_category(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Category>, RequestError> {
    let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(category)
}

async fn find_category_by_slug(
    conn: &mut SqliteConnection,
    slug: &str,
) -> Result<Option<Category>, RequestError> {
    let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = ?")
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(category)
}

/// Resolves a path segment that is either a numeric id or a slug. Numbers
/// are tried as ids first and then as slugs.
pub async fn get_category_in_db(
    pool: &SqlitePool,
    identifier: &str,
) -> Result<Category, RequestError> {
    let identifier = identifier.trim();
    let mut conn = pool.acquire().await?;

    let by_id = match identifier.parse::<i64>() {
        Ok(id) => find_category(&mut conn, id).await?,
        Err(_) if SLUG_SHAPE.is_match(identifier) => None,
        Err(_) => return Err(RequestError::invalid("Invalid category ID format")),
    };
    let category = match by_id {
        Some(category) => Some(category),
        None => find_category_by_slug(&mut conn, identifier).await?,
    };
    category.ok_or(RequestError::NotFound("Category not found"))
}

pub async fn update_category_in_db(
    pool: &SqlitePool,
    id: i64,
    CategoryChanges { name, description }: CategoryChanges,
) -> Result<Category, RequestError> {
    let mut tx = begin_write(pool).await?;
    let category = find_category(&mut tx, id)
        .await?
        .ok_or(RequestError::NotFound("Category not found"))?;

    if let Some((name, slug)) = &name {
        if name != &category.name {
            let clash: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM categories WHERE (name = ? COLLATE NOCASE OR slug = ?) AND id != ?",
            )
            .bind(name)
            .bind(slug)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
            if clash.is_some() {
                return Err(RequestError::Conflict("Category name already exists"));
            }
        }
    }

    let (name, slug) = name.unwrap_or((category.name, category.slug));
    let updated = sqlx::query_as::<_, Category>(
        r#"
        UPDATE categories
        SET name = ?, slug = ?, description = ?, updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(slug)
    .bind(description.unwrap_or(category.description))
    .bind(Utc::now())
    .bind(id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "Category name already exists"))?;
    tx.commit().await?;

    tracing::info!(category_id = id, "category updated");
    Ok(updated)
}

pub async fn delete_category_in_db(pool: &SqlitePool, id: i64) -> Result<(), RequestError> {
    let mut tx = begin_write(pool).await?;
    if find_category(&mut tx, id).await?.is_none() {
        return Err(RequestError::NotFound("Category not found"));
    }

    let posts_using: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE category_id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if posts_using > 0 {
        return Err(RequestError::Conflict(
            "Cannot delete category because it is being used",
        ));
    }

    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(category_id = id, "category deleted");
    Ok(())
}
