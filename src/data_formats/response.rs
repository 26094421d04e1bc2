use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Category, Comment, Post, PostImage, PostStatus, Role, User};

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub profile_pic: String,
    pub bio: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The public face of a user embedded in posts and comments.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: i64,
    pub username: String,
    pub profile_pic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub url: String,
    pub public_id: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub thumbnail: String,
    pub images: Vec<ImageResponse>,
    pub author: AuthorSummary,
    pub category: CategorySummary,
    pub tags: Vec<String>,
    pub likes: Vec<i64>,
    pub likes_count: usize,
    pub views: i64,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
}

/// Listings carry the post id; a single comment carries a summary.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommentPost {
    Id(i64),
    Summary(PostSummary),
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: i64,
    pub content: String,
    pub author: AuthorSummary,
    pub post: CommentPost,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn new(
        User {
            id,
            username,
            email,
            profile_pic,
            bio,
            role,
            created_at,
            ..
        }: User,
    ) -> Self {
        UserResponse {
            id,
            username,
            email,
            profile_pic,
            bio,
            role,
            created_at,
        }
    }
}

impl AuthorSummary {
    pub fn new(
        User {
            id,
            username,
            profile_pic,
            ..
        }: User,
    ) -> Self {
        AuthorSummary {
            id,
            username,
            profile_pic,
            email: None,
        }
    }

    pub fn with_email(user: User) -> Self {
        let email = user.email.clone();
        AuthorSummary {
            email: Some(email),
            ..AuthorSummary::new(user)
        }
    }
}

impl CategoryResponse {
    pub fn new(
        Category {
            id,
            name,
            description,
            slug,
            created_at,
            updated_at,
        }: Category,
    ) -> Self {
        CategoryResponse {
            id,
            name,
            description,
            slug,
            created_at,
            updated_at,
        }
    }
}

impl CategorySummary {
    pub fn new(category: Category) -> Self {
        CategorySummary {
            id: category.id,
            name: category.name,
            description: None,
        }
    }

    pub fn with_description(category: Category) -> Self {
        CategorySummary {
            id: category.id,
            name: category.name,
            description: Some(category.description),
        }
    }
}

impl From<PostImage> for ImageResponse {
    fn from(PostImage { url, public_id, .. }: PostImage) -> Self {
        ImageResponse { url, public_id }
    }
}

impl PostResponse {
    pub fn new(
        Post {
            id,
            title,
            slug,
            content,
            excerpt,
            thumbnail,
            views,
            status,
            created_at,
            updated_at,
            ..
        }: Post,
        author: AuthorSummary,
        category: CategorySummary,
        images: Vec<PostImage>,
        tags: Vec<String>,
        likes: Vec<i64>,
    ) -> Self {
        PostResponse {
            id,
            title,
            slug,
            content,
            excerpt,
            thumbnail,
            images: images.into_iter().map(ImageResponse::from).collect(),
            author,
            category,
            tags,
            likes_count: likes.len(),
            likes,
            views,
            status,
            created_at,
            updated_at,
        }
    }
}

impl PostSummary {
    pub fn new(post: &Post) -> Self {
        PostSummary {
            id: post.id,
            title: post.title.clone(),
            slug: post.slug.clone(),
        }
    }
}

impl CommentResponse {
    pub fn new(
        Comment {
            id,
            content,
            created_at,
            updated_at,
            ..
        }: Comment,
        author: AuthorSummary,
        post: CommentPost,
    ) -> Self {
        CommentResponse {
            id,
            content,
            author,
            post,
            created_at,
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn writer() -> User {
        User {
            id: 7,
            username: "writer".to_owned(),
            email: "writer@example.com".to_owned(),
            profile_pic: "pic.png".to_owned(),
            bio: "hi".to_owned(),
            role: Role::User,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn user_response_uses_camel_case_and_hides_nothing_secret() {
        let value = serde_json::to_value(UserResponse::new(writer())).unwrap();
        assert_eq!(value["profilePic"], "pic.png");
        assert_eq!(value["role"], "user");
        assert!(value.get("password").is_none());
        assert!(value.get("updatedAt").is_none());
    }

    #[test]
    fn author_summary_email_is_optional() {
        let plain = serde_json::to_value(AuthorSummary::new(writer())).unwrap();
        assert_eq!(plain, json!({"id": 7, "username": "writer", "profilePic": "pic.png"}));

        let detailed = serde_json::to_value(AuthorSummary::with_email(writer())).unwrap();
        assert_eq!(detailed["email"], "writer@example.com");
    }

    #[test]
    fn comment_post_serializes_as_id_or_summary() {
        assert_eq!(serde_json::to_value(CommentPost::Id(3)).unwrap(), json!(3));
        let summary = CommentPost::Summary(PostSummary {
            id: 3,
            title: "Hello".to_owned(),
            slug: "hello".to_owned(),
        });
        assert_eq!(
            serde_json::to_value(summary).unwrap(),
            json!({"id": 3, "title": "Hello", "slug": "hello"})
        );
    }
}
