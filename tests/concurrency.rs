use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use blogsphere::{
    db_helpers::{get_user_by_id, toggle_like_in_db, update_comment_in_db},
    init_db, CommentRequest,
};
use chrono::Utc;
use sqlx::SqlitePool;

const WRITERS: i64 = 16;

/// A database file of its own, removed with its WAL side files on drop.
struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let path = std::env::temp_dir().join(format!(
            "blogsphere-{}-{}.db",
            std::process::id(),
            nanos
        ));
        TempDb { path }
    }

    fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// `WRITERS` users, one category and one post by the first user.
async fn seed(pool: &SqlitePool) -> i64 {
    let now = Utc::now();
    for n in 1..=WRITERS {
        sqlx::query(
            "INSERT INTO users (id, username, email, password, created_at, updated_at) \
             VALUES (?, ?, ?, 'not-a-hash', ?, ?)",
        )
        .bind(n)
        .bind(format!("user{n}"))
        .bind(format!("user{n}@example.com"))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
    }
    sqlx::query(
        "INSERT INTO categories (id, name, slug, created_at, updated_at) \
         VALUES (1, 'Tech', 'tech', ?, ?)",
    )
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
    sqlx::query_scalar(
        "INSERT INTO posts (title, slug, content, author_id, category_id, created_at, updated_at) \
         VALUES ('Busy', 'busy', 'Body', 1, 1, ?, ?) RETURNING id",
    )
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_likes_all_land() {
    let db = TempDb::new();
    let pool = init_db(&db.url()).await.unwrap();
    let post = seed(&pool).await;

    let tasks: Vec<_> = (1..=WRITERS)
        .map(|user| {
            let pool = pool.clone();
            tokio::spawn(async move { toggle_like_in_db(&pool, post, user).await })
        })
        .collect();
    for task in tasks {
        let (_, liked) = task.await.unwrap().expect("like is recorded");
        assert!(liked);
    }

    let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
        .bind(post)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(likes, WRITERS);
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_comment_edits_all_succeed() {
    let db = TempDb::new();
    let pool = init_db(&db.url()).await.unwrap();
    let post = seed(&pool).await;

    let mut comments = Vec::new();
    for user in 1..=WRITERS {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO comments (content, author_id, post_id, created_at, updated_at) \
             VALUES ('first', ?, ?, ?, ?) RETURNING id",
        )
        .bind(user)
        .bind(post)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&pool)
        .await
        .unwrap();
        comments.push((user, id));
    }

    let tasks: Vec<_> = comments
        .into_iter()
        .map(|(user, id)| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let author = get_user_by_id(&pool, user).await?.expect("user exists");
                let request = CommentRequest {
                    content: Some(format!("edit by {user}")),
                };
                update_comment_in_db(&pool, id, &author, request).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().expect("edit is saved");
    }

    let edited: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE content LIKE 'edit by %'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(edited, WRITERS);
    pool.close().await;
}
