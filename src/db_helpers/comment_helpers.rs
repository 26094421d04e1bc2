use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::{
    data_formats::{
        AuthorSummary, CommentOrder, CommentPost, CommentRequest, CommentResponse, PageRequest,
        PostSummary,
    },
    errors::RequestError,
    models::{Comment, Post, User},
};

use super::{begin_write, find_user, get_post_row, push_id_list, unique_ids, users_by_ids};

async fn find_comment(conn: &mut SqliteConnection, id: i64) -> Result<Comment, RequestError> {
    sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RequestError::NotFound("Comment not found"))
}

async fn post_summaries(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<HashMap<i64, PostSummary>, RequestError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM posts WHERE id IN ");
    push_id_list(&mut query, ids);
    let posts = query.build_query_as::<Post>().fetch_all(&mut *conn).await?;
    Ok(posts
        .iter()
        .map(|post| (post.id, PostSummary::new(post)))
        .collect())
}

/// Attaches authors, and post summaries when `with_posts` is set.
async fn assemble_comments(
    conn: &mut SqliteConnection,
    comments: Vec<Comment>,
    with_posts: bool,
) -> Result<Vec<CommentResponse>, RequestError> {
    let authors = users_by_ids(conn, &unique_ids(comments.iter().map(|c| c.author_id))).await?;
    let posts = if with_posts {
        post_summaries(conn, &unique_ids(comments.iter().map(|c| c.post_id))).await?
    } else {
        HashMap::new()
    };

    comments
        .into_iter()
        .map(|comment| {
            let author = authors.get(&comment.author_id).cloned().ok_or_else(|| {
                RequestError::ServerError(format!("Author of comment {} is missing", comment.id))
            })?;
            let post = match posts.get(&comment.post_id) {
                Some(summary) if with_posts => CommentPost::Summary(summary.clone()),
                _ => CommentPost::Id(comment.post_id),
            };
            Ok(CommentResponse::new(comment, AuthorSummary::new(author), post))
        })
        .collect()
}

async fn single_view(
    conn: &mut SqliteConnection,
    comment: Comment,
    with_post: bool,
) -> Result<CommentResponse, RequestError> {
    let id = comment.id;
    assemble_comments(conn, vec![comment], with_post)
        .await?
        .pop()
        .ok_or_else(|| RequestError::ServerError(format!("Comment {} could not be assembled", id)))
}

pub async fn list_comments_for_post_in_db(
    pool: &SqlitePool,
    post_id: i64,
    order: CommentOrder,
    page: PageRequest,
) -> Result<(Vec<CommentResponse>, i64), RequestError> {
    get_post_row(pool, post_id).await?;

    let mut conn = pool.acquire().await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = ?")
        .bind(post_id)
        .fetch_one(&mut *conn)
        .await?;

    let direction = if order.descending { "DESC" } else { "ASC" };
    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM comments WHERE post_id = ");
    query
        .push_bind(post_id)
        .push(format!(
            " ORDER BY {} {}, id {} LIMIT ",
            order.column, direction, direction
        ))
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let comments = query
        .build_query_as::<Comment>()
        .fetch_all(&mut *conn)
        .await?;

    let comments = assemble_comments(&mut conn, comments, false).await?;
    Ok((comments, total))
}

pub async fn add_comment_in_db(
    pool: &SqlitePool,
    post_id: i64,
    author: &User,
    content: String,
) -> Result<CommentResponse, RequestError> {
    get_post_row(pool, post_id).await?;

    let now = Utc::now();
    let comment = sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (content, author_id, post_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(content)
    .bind(author.id)
    .bind(post_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    tracing::info!(comment_id = comment.id, post_id, author_id = author.id, "comment added");
    Ok(CommentResponse::new(
        comment,
        AuthorSummary::new(author.clone()),
        CommentPost::Id(post_id),
    ))
}

pub async fn get_comment_in_db(pool: &SqlitePool, id: i64) -> Result<CommentResponse, RequestError> {
    let mut conn = pool.acquire().await?;
    let comment = find_comment(&mut conn, id).await?;
    single_view(&mut conn, comment, true).await
}

pub async fn update_comment_in_db(
    pool: &SqlitePool,
    id: i64,
    caller: &User,
    request: CommentRequest,
) -> Result<CommentResponse, RequestError> {
    let mut tx = begin_write(pool).await?;
    let comment = find_comment(&mut tx, id).await?;
    if !caller.can_modify(comment.author_id) {
        return Err(RequestError::Forbidden(
            "Not authorized to update this comment",
        ));
    }
    let content = request.validate()?;

    let comment = sqlx::query_as::<_, Comment>(
        "UPDATE comments SET content = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(content)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    let view = single_view(&mut tx, comment, false).await?;
    tx.commit().await?;

    tracing::info!(comment_id = id, editor_id = caller.id, "comment updated");
    Ok(view)
}

pub async fn delete_comment_in_db(
    pool: &SqlitePool,
    id: i64,
    caller: &User,
) -> Result<(), RequestError> {
    let mut tx = begin_write(pool).await?;
    let comment = find_comment(&mut tx, id).await?;
    if !caller.can_modify(comment.author_id) {
        return Err(RequestError::Forbidden(
            "Not authorized to delete this comment",
        ));
    }

    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(comment_id = id, deleted_by = caller.id, "comment deleted");
    Ok(())
}

pub async fn list_comments_by_user_in_db(
    pool: &SqlitePool,
    user_id: i64,
    page: PageRequest,
) -> Result<(User, Vec<CommentResponse>, i64), RequestError> {
    let mut conn = pool.acquire().await?;
    let user = find_user(&mut conn, user_id)
        .await?
        .ok_or(RequestError::NotFound("User not found"))?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE author_id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    let comments = sqlx::query_as::<_, Comment>(
        r#"
        SELECT * FROM comments
        WHERE author_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&mut *conn)
    .await?;

    let comments = assemble_comments(&mut conn, comments, true).await?;
    Ok((user, comments, total))
}
