use serde::Serialize;

use super::response::{
    AuthorSummary, CategoryResponse, CommentResponse, PostResponse, UserResponse,
};
use super::PageRequest;

/// `{ "success": true, <data fields>, "message"?: ... }`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

#[derive(Debug, Serialize, Default)]
pub struct NoData {}

impl<T> Envelope<T> {
    pub fn wrap(data: T) -> Envelope<T> {
        Envelope {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Envelope<T> {
        Envelope {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

impl Envelope<NoData> {
    pub fn message(message: impl Into<String>) -> Envelope<NoData> {
        Envelope::with_message(NoData {}, message)
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: i64,
    pub total_count: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: PageRequest, total_count: i64) -> Self {
        let limit = page.limit();
        let total_pages = (total_count + limit - 1) / limit;
        let current = i64::from(page.page);
        Pagination {
            current_page: page.page,
            total_pages,
            total_count,
            has_next: current < total_pages,
            has_prev: current > 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthWrapper {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserWrapper {
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct PostWrapper {
    pub post: PostResponse,
}

#[derive(Debug, Serialize)]
pub struct MultiplePostsWrapper {
    pub posts: Vec<PostResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct AuthorPostsWrapper {
    pub posts: Vec<PostResponse>,
    pub author: AuthorSummary,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingPostsWrapper {
    pub posts: Vec<PostResponse>,
    pub time_frame: &'static str,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct RelatedPostsWrapper {
    pub posts: Vec<PostResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LikeWrapper {
    pub likes_count: i64,
    pub is_liked: bool,
}

#[derive(Debug, Serialize)]
pub struct CategoryWrapper {
    pub category: CategoryResponse,
}

#[derive(Debug, Serialize)]
pub struct MultipleCategoriesWrapper {
    pub categories: Vec<CategoryResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct CommentWrapper {
    pub comment: CommentResponse,
}

#[derive(Debug, Serialize)]
pub struct MultipleCommentsWrapper {
    pub comments: Vec<CommentResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct UserCommentsWrapper {
    pub comments: Vec<CommentResponse>,
    pub user: AuthorSummary,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(page: u32, limit: u32) -> PageRequest {
        PageRequest::new(Some(page), Some(limit), 10).unwrap()
    }

    #[test]
    fn pagination_metadata() {
        assert_eq!(
            Pagination::new(page(1, 10), 25),
            Pagination {
                current_page: 1,
                total_pages: 3,
                total_count: 25,
                has_next: true,
                has_prev: false,
            }
        );
        let last = Pagination::new(page(3, 10), 25);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let empty = Pagination::new(page(1, 10), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }

    #[test]
    fn envelope_flattens_data_and_skips_missing_message() {
        let value = serde_json::to_value(Envelope::wrap(LikeWrapper {
            likes_count: 2,
            is_liked: true,
        }))
        .unwrap();
        assert_eq!(value, json!({"success": true, "likesCount": 2, "isLiked": true}));

        let value = serde_json::to_value(Envelope::message("Logged Out Successfully")).unwrap();
        assert_eq!(value, json!({"success": true, "message": "Logged Out Successfully"}));
    }
}
