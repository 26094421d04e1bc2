use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::{
    data_formats::{
        AuthorSummary, CategorySummary, NewPost, PageRequest, PostChanges, PostFilter, PostForm,
        PostResponse, TimeFrame,
    },
    errors::{conflict_on_unique, RequestError},
    media::{ImageUpload, MediaStore, StoredImage},
    models::{Category, Post, PostImage, PostStatus, User},
};

use super::{
    begin_write, escape_like, find_category, find_user, push_id_list, unique_ids, users_by_ids,
};

const SLUG_TAKEN: &str = "A post with this title already exists";

/// How much of the author and category a post view embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detail {
    Summary,
    Full,
}

// ----------------- Assembly -----------------

async fn find_post(conn: &mut SqliteConnection, id: i64) -> Result<Option<Post>, RequestError> {
    let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(post)
}

pub(crate) async fn get_post_row(pool: &SqlitePool, id: i64) -> Result<Post, RequestError> {
    let mut conn = pool.acquire().await?;
    find_post(&mut conn, id)
        .await?
        .ok_or(RequestError::NotFound("Post not found"))
}

fn group_by_post<T>(rows: Vec<(i64, T)>) -> HashMap<i64, Vec<T>> {
    let mut grouped: HashMap<i64, Vec<T>> = HashMap::new();
    for (post_id, value) in rows {
        grouped.entry(post_id).or_default().push(value);
    }
    grouped
}

async fn categories_by_ids(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<HashMap<i64, Category>, RequestError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM categories WHERE id IN ");
    push_id_list(&mut query, ids);
    let categories = query
        .build_query_as::<Category>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(categories.into_iter().map(|c| (c.id, c)).collect())
}

async fn images_by_post(
    conn: &mut SqliteConnection,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<PostImage>>, RequestError> {
    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM post_images WHERE post_id IN ");
    push_id_list(&mut query, post_ids);
    query.push(" ORDER BY id");
    let images = query
        .build_query_as::<PostImage>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(group_by_post(
        images.into_iter().map(|image| (image.post_id, image)).collect(),
    ))
}

async fn tags_by_post(
    conn: &mut SqliteConnection,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>, RequestError> {
    let mut query = QueryBuilder::<Sqlite>::new("SELECT post_id, tag FROM post_tags WHERE post_id IN ");
    push_id_list(&mut query, post_ids);
    query.push(" ORDER BY post_id, position");
    let rows = query
        .build_query_as::<(i64, String)>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(group_by_post(rows))
}

async fn likes_by_post(
    conn: &mut SqliteConnection,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<i64>>, RequestError> {
    let mut query =
        QueryBuilder::<Sqlite>::new("SELECT post_id, user_id FROM post_likes WHERE post_id IN ");
    push_id_list(&mut query, post_ids);
    query.push(" ORDER BY post_id, created_at, user_id");
    let rows = query
        .build_query_as::<(i64, i64)>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(group_by_post(rows))
}

/// Batch-loads authors, categories, images, tags and likes for `posts` and
/// builds their views, keeping the order of `posts`.
async fn assemble_posts(
    conn: &mut SqliteConnection,
    posts: Vec<Post>,
    detail: Detail,
) -> Result<Vec<PostResponse>, RequestError> {
    if posts.is_empty() {
        return Ok(Vec::new());
    }
    let post_ids: Vec<i64> = posts.iter().map(|post| post.id).collect();
    let authors = users_by_ids(conn, &unique_ids(posts.iter().map(|p| p.author_id))).await?;
    let categories =
        categories_by_ids(conn, &unique_ids(posts.iter().map(|p| p.category_id))).await?;
    let mut images = images_by_post(conn, &post_ids).await?;
    let mut tags = tags_by_post(conn, &post_ids).await?;
    let mut likes = likes_by_post(conn, &post_ids).await?;

    posts
        .into_iter()
        .map(|post| {
            let author = authors.get(&post.author_id).cloned().ok_or_else(|| {
                RequestError::ServerError(format!("Author of post {} is missing", post.id))
            })?;
            let category = categories.get(&post.category_id).cloned().ok_or_else(|| {
                RequestError::ServerError(format!("Category of post {} is missing", post.id))
            })?;
            let (author, category) = match detail {
                Detail::Summary => (AuthorSummary::new(author), CategorySummary::new(category)),
                Detail::Full => (
                    AuthorSummary::with_email(author),
                    CategorySummary::with_description(category),
                ),
            };
            let id = post.id;
            Ok(PostResponse::new(
                post,
                author,
                category,
                images.remove(&id).unwrap_or_default(),
                tags.remove(&id).unwrap_or_default(),
                likes.remove(&id).unwrap_or_default(),
            ))
        })
        .collect()
}

async fn load_post(pool: &SqlitePool, id: i64) -> Result<PostResponse, RequestError> {
    let mut conn = pool.acquire().await?;
    let post = find_post(&mut conn, id)
        .await?
        .ok_or(RequestError::NotFound("Post not found"))?;
    let mut views = assemble_posts(&mut conn, vec![post], Detail::Summary).await?;
    views
        .pop()
        .ok_or_else(|| RequestError::ServerError(format!("Post {} could not be assembled", id)))
}

// ----------------- Media -----------------

/// Uploads in order; if one upload fails the earlier ones are purged again.
async fn upload_images(
    media: &dyn MediaStore,
    images: Vec<ImageUpload>,
) -> Result<Vec<StoredImage>, RequestError> {
    let mut stored = Vec::with_capacity(images.len());
    for image in images {
        match media.upload(image).await {
            Ok(image) => stored.push(image),
            Err(error) => {
                purge_uploaded(media, &stored).await;
                return Err(error.into());
            }
        }
    }
    Ok(stored)
}

/// Best-effort removal of images that never made it into a post.
async fn purge_uploaded(media: &dyn MediaStore, images: &[StoredImage]) {
    for image in images {
        if let Err(error) = media.delete(&image.public_id).await {
            tracing::warn!(public_id = %image.public_id, %error, "failed to purge uploaded image");
        }
    }
}

async fn insert_images(
    conn: &mut SqliteConnection,
    post_id: i64,
    images: &[StoredImage],
) -> Result<(), RequestError> {
    for image in images {
        sqlx::query("INSERT INTO post_images (post_id, url, public_id) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(&image.url)
            .bind(&image.public_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn replace_tags(
    conn: &mut SqliteConnection,
    post_id: i64,
    tags: &[String],
) -> Result<(), RequestError> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;
    for (position, tag) in tags.iter().enumerate() {
        sqlx::query("INSERT INTO post_tags (post_id, tag, position) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(tag)
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Points the thumbnail at the first image still attached, or clears it.
async fn refresh_thumbnail(conn: &mut SqliteConnection, post_id: i64) -> Result<(), RequestError> {
    sqlx::query(
        r#"
        UPDATE posts
        SET thumbnail = COALESCE(
            (SELECT url FROM post_images WHERE post_id = ?1 ORDER BY id LIMIT 1),
            ''
        )
        WHERE id = ?1
        "#,
    )
    .bind(post_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn ensure_category(pool: &SqlitePool, category_id: i64) -> Result<(), RequestError> {
    let mut conn = pool.acquire().await?;
    match find_category(&mut conn, category_id).await? {
        Some(_) => Ok(()),
        None => Err(RequestError::NotFound("Category not found")),
    }
}

async fn slug_taken(pool: &SqlitePool, slug: &str, except: i64) -> Result<bool, RequestError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE slug = ? AND id != ?")
        .bind(slug)
        .bind(except)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

// ----------------- Post Queries -----------------

pub async fn create_post_in_db(
    pool: &SqlitePool,
    media: &dyn MediaStore,
    author: &User,
    post: NewPost,
    images: Vec<ImageUpload>,
) -> Result<PostResponse, RequestError> {
    ensure_category(pool, post.category_id).await?;
    if slug_taken(pool, &post.slug, 0).await? {
        return Err(RequestError::Conflict(SLUG_TAKEN));
    }

    let stored = upload_images(media, images).await?;
    let post_id = match insert_post(pool, author.id, post, &stored).await {
        Ok(post_id) => post_id,
        Err(error) => {
            purge_uploaded(media, &stored).await;
            return Err(error);
        }
    };

    tracing::info!(post_id, author_id = author.id, images = stored.len(), "post created");
    load_post(pool, post_id).await
}

async fn insert_post(
    pool: &SqlitePool,
    author_id: i64,
    NewPost {
        title,
        slug,
        content,
        excerpt,
        category_id,
        tags,
        status,
    }: NewPost,
    images: &[StoredImage],
) -> Result<i64, RequestError> {
    let thumbnail = images.first().map(|image| image.url.clone()).unwrap_or_default();
    let now = Utc::now();

    let mut tx = begin_write(pool).await?;
    let post_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO posts
            (title, slug, content, excerpt, thumbnail, author_id, category_id, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(title)
    .bind(slug)
    .bind(content)
    .bind(excerpt)
    .bind(thumbnail)
    .bind(author_id)
    .bind(category_id)
    .bind(status)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, SLUG_TAKEN))?;
    insert_images(&mut tx, post_id, images).await?;
    replace_tags(&mut tx, post_id, &tags).await?;
    tx.commit().await?;
    Ok(post_id)
}

fn push_post_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    query.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        query.push(" AND posts.status = ").push_bind(status);
    }
    if let Some(category) = filter.category {
        query.push(" AND posts.category_id = ").push_bind(category);
    }
    if let Some(author) = filter.author {
        query.push(" AND posts.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query.push(
            " AND EXISTS (SELECT 1 FROM post_tags WHERE post_tags.post_id = posts.id AND post_tags.tag IN (",
        );
        let mut separated = query.separated(", ");
        for tag in &filter.tags {
            separated.push_bind(tag.clone());
        }
        separated.push_unseparated("))");
    }
    if let Some(search) = &filter.search {
        let pattern = escape_like(search);
        query
            .push(" AND (posts.title LIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\' OR posts.content LIKE ")
            .push_bind(pattern)
            .push(r" ESCAPE '\')");
    }
}

pub async fn list_posts_in_db(
    pool: &SqlitePool,
    filter: &PostFilter,
    page: PageRequest,
) -> Result<(Vec<PostResponse>, i64), RequestError> {
    let mut conn = pool.acquire().await?;

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts");
    push_post_filter(&mut count, filter);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&mut *conn)
        .await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT posts.* FROM posts");
    push_post_filter(&mut query, filter);
    query
        .push(" ORDER BY posts.created_at DESC, posts.id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let posts = query
        .build_query_as::<Post>()
        .fetch_all(&mut *conn)
        .await?;

    let posts = assemble_posts(&mut conn, posts, Detail::Summary).await?;
    Ok((posts, total))
}

/// Returns the post with its view count already bumped.
pub async fn get_post_in_db(pool: &SqlitePool, id: i64) -> Result<PostResponse, RequestError> {
    let mut conn = pool.acquire().await?;
    let mut post = find_post(&mut conn, id)
        .await?
        .ok_or(RequestError::NotFound("Post not found"))?;

    // read-modify-write: concurrent readers may overwrite each other
    post.views += 1;
    sqlx::query("UPDATE posts SET views = ? WHERE id = ?")
        .bind(post.views)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let mut views = assemble_posts(&mut conn, vec![post], Detail::Full).await?;
    views
        .pop()
        .ok_or_else(|| RequestError::ServerError(format!("Post {} could not be assembled", id)))
}

pub async fn update_post_in_db(
    pool: &SqlitePool,
    media: &dyn MediaStore,
    caller: &User,
    id: i64,
    form: PostForm,
) -> Result<PostResponse, RequestError> {
    let post = get_post_row(pool, id).await?;
    if !caller.can_modify(post.author_id) {
        return Err(RequestError::Forbidden("Not authorized to update this post"));
    }
    // the body is only judged once the caller may edit the post
    let (changes, images) = form.validate_changes()?;
    if let Some(category_id) = changes.category_id {
        ensure_category(pool, category_id).await?;
    }
    if let Some((_, slug)) = &changes.title {
        if slug_taken(pool, slug, id).await? {
            return Err(RequestError::Conflict(SLUG_TAKEN));
        }
    }

    let stored = upload_images(media, images).await?;
    if let Err(error) = save_post_changes(pool, id, changes, &stored).await {
        purge_uploaded(media, &stored).await;
        return Err(error);
    }

    tracing::info!(post_id = id, editor_id = caller.id, new_images = stored.len(), "post updated");
    load_post(pool, id).await
}

async fn save_post_changes(
    pool: &SqlitePool,
    id: i64,
    PostChanges {
        title,
        content,
        excerpt,
        category_id,
        tags,
        status,
    }: PostChanges,
    new_images: &[StoredImage],
) -> Result<(), RequestError> {
    let mut query = QueryBuilder::<Sqlite>::new("UPDATE posts SET ");
    let mut assignments = query.separated(", ");
    assignments.push("updated_at = ").push_bind_unseparated(Utc::now());
    if let Some((title, slug)) = title {
        assignments.push("title = ").push_bind_unseparated(title);
        assignments.push("slug = ").push_bind_unseparated(slug);
    }
    if let Some(content) = content {
        assignments.push("content = ").push_bind_unseparated(content);
    }
    if let Some(excerpt) = excerpt {
        assignments.push("excerpt = ").push_bind_unseparated(excerpt);
    }
    if let Some(category_id) = category_id {
        assignments.push("category_id = ").push_bind_unseparated(category_id);
    }
    if let Some(status) = status {
        assignments.push("status = ").push_bind_unseparated(status);
    }
    query.push(" WHERE id = ").push_bind(id);

    let mut tx = begin_write(pool).await?;
    query
        .build()
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, SLUG_TAKEN))?;
    if !new_images.is_empty() {
        insert_images(&mut tx, id, new_images).await?;
        refresh_thumbnail(&mut tx, id).await?;
    }
    if let Some(tags) = tags {
        replace_tags(&mut tx, id, &tags).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Purges the post's images one at a time, dropping each image row once its
/// purge succeeded. The first failure keeps the post with the images that
/// are still stored so a retry can pick up where this one stopped.
pub async fn delete_post_in_db(
    pool: &SqlitePool,
    media: &dyn MediaStore,
    caller: &User,
    id: i64,
) -> Result<(), RequestError> {
    let post = get_post_row(pool, id).await?;
    if !caller.can_modify(post.author_id) {
        return Err(RequestError::Forbidden("Not authorized to delete this post"));
    }

    let images = sqlx::query_as::<_, PostImage>(
        "SELECT * FROM post_images WHERE post_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    for image in images {
        if let Err(error) = media.delete(&image.public_id).await {
            tracing::error!(post_id = id, public_id = %image.public_id, %error, "image purge failed");
            let mut conn = pool.acquire().await?;
            refresh_thumbnail(&mut conn, id).await?;
            return Err(RequestError::ServerError(format!(
                "Failed to delete image {}, the post was kept: {}",
                image.public_id, error
            )));
        }
        sqlx::query("DELETE FROM post_images WHERE id = ?")
            .bind(image.id)
            .execute(pool)
            .await?;
    }

    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    tracing::info!(post_id = id, deleted_by = caller.id, "post deleted");
    Ok(())
}

/// Returns the new like count and whether `user_id` now likes the post.
pub async fn toggle_like_in_db(
    pool: &SqlitePool,
    post_id: i64,
    user_id: i64,
) -> Result<(i64, bool), RequestError> {
    let mut tx = begin_write(pool).await?;
    if find_post(&mut tx, post_id).await?.is_none() {
        return Err(RequestError::NotFound("Post not found"));
    }

    let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let liked = if removed == 0 {
        sqlx::query(
            "INSERT OR IGNORE INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(post_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        true
    } else {
        false
    };

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::debug!(post_id, user_id, liked, count, "like toggled");
    Ok((count, liked))
}

pub async fn trending_posts_in_db(
    pool: &SqlitePool,
    time_frame: TimeFrame,
    limit: i64,
) -> Result<Vec<PostResponse>, RequestError> {
    let since = Utc::now() - time_frame.lookback();
    let mut conn = pool.acquire().await?;
    let posts = sqlx::query_as::<_, Post>(
        r#"
        SELECT posts.* FROM posts
        WHERE posts.status = ? AND posts.created_at >= ?
        ORDER BY posts.views DESC,
                 (SELECT COUNT(*) FROM post_likes WHERE post_likes.post_id = posts.id) DESC,
                 posts.id DESC
        LIMIT ?
        "#,
    )
    .bind(PostStatus::Published)
    .bind(since)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    assemble_posts(&mut conn, posts, Detail::Summary).await
}

/// Published posts other than `id` that share its category or any tag.
pub async fn related_posts_in_db(
    pool: &SqlitePool,
    id: i64,
    limit: i64,
) -> Result<Vec<PostResponse>, RequestError> {
    let mut conn = pool.acquire().await?;
    let post = find_post(&mut conn, id)
        .await?
        .ok_or(RequestError::NotFound("Post not found"))?;

    let posts = sqlx::query_as::<_, Post>(
        r#"
        SELECT posts.* FROM posts
        WHERE posts.id != ?1
          AND posts.status = ?2
          AND (posts.category_id = ?3
               OR EXISTS (SELECT 1 FROM post_tags
                          WHERE post_tags.post_id = posts.id
                            AND post_tags.tag IN (SELECT tag FROM post_tags WHERE post_id = ?1)))
        ORDER BY posts.created_at DESC, posts.id DESC
        LIMIT ?4
        "#,
    )
    .bind(id)
    .bind(PostStatus::Published)
    .bind(post.category_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    assemble_posts(&mut conn, posts, Detail::Summary).await
}

pub async fn posts_by_author_in_db(
    pool: &SqlitePool,
    author_id: i64,
    status: Option<PostStatus>,
    page: PageRequest,
) -> Result<(User, Vec<PostResponse>, i64), RequestError> {
    let author = {
        let mut conn = pool.acquire().await?;
        find_user(&mut conn, author_id)
            .await?
            .ok_or(RequestError::NotFound("Author not found"))?
    };
    let filter = PostFilter {
        author: Some(author_id),
        status,
        ..Default::default()
    };
    let (posts, total) = list_posts_in_db(pool, &filter, page).await?;
    Ok((author, posts, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_grouped_per_post_in_order() {
        let grouped = group_by_post(vec![(1, "a"), (2, "x"), (1, "b")]);
        assert_eq!(grouped[&1], vec!["a", "b"]);
        assert_eq!(grouped[&2], vec!["x"]);
    }
}
