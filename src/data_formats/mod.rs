mod request;
mod response;
mod wrapper;

pub use request::*;
pub use response::*;
pub use wrapper::*;

use serde::Deserialize;

use crate::errors::RequestError;
use crate::models::PostStatus;

pub const MAX_PAGE_SIZE: u32 = 100;

/// Parses a path or query identifier. Anything that is not a positive integer
/// is malformed, which callers report apart from "not found".
pub fn parse_id(raw: &str, what: &str) -> Result<i64, RequestError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(RequestError::invalid(format!("Invalid {} ID format", what))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Result<Self, RequestError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(default_limit);
        if page < 1 {
            return Err(RequestError::invalid("page must be at least 1"));
        }
        if limit < 1 || limit > MAX_PAGE_SIZE {
            return Err(RequestError::invalid(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(PageRequest { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.limit)
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct PageQueryParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CategoryQueryParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct PostQueryParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    /// Absent means published; an empty value means every status.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub category: Option<i64>,
    pub author: Option<i64>,
    pub tags: Vec<String>,
    pub search: Option<String>,
    pub status: Option<PostStatus>,
}

impl PostQueryParams {
    pub fn into_filter(self) -> Result<(PostFilter, PageRequest), RequestError> {
        let page = PageRequest::new(self.page, self.limit, 10)?;
        let category = non_empty(self.category)
            .map(|raw| parse_id(&raw, "category"))
            .transpose()?;
        let author = non_empty(self.author)
            .map(|raw| parse_id(&raw, "author"))
            .transpose()?;
        let tags = self.tags.as_deref().map(split_tags).unwrap_or_default();
        let status = parse_status_filter(self.status)?;
        Ok((
            PostFilter {
                category,
                author,
                tags,
                search: non_empty(self.search),
                status,
            },
            page,
        ))
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct AuthorPostsQueryParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrendingQueryParams {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub time_frame: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFrame {
    Day,
    Week,
    Month,
}

impl TimeFrame {
    pub fn parse(raw: Option<&str>) -> Result<Self, RequestError> {
        match raw.map(str::trim).unwrap_or("week") {
            "day" => Ok(TimeFrame::Day),
            "week" | "" => Ok(TimeFrame::Week),
            "month" => Ok(TimeFrame::Month),
            other => Err(RequestError::invalid(format!(
                "Unknown timeFrame '{}', expected day, week or month",
                other
            ))),
        }
    }

    pub fn lookback(&self) -> chrono::Duration {
        match self {
            TimeFrame::Day => chrono::Duration::days(1),
            TimeFrame::Week => chrono::Duration::days(7),
            TimeFrame::Month => chrono::Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::Day => "day",
            TimeFrame::Week => "week",
            TimeFrame::Month => "month",
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct RelatedQueryParams {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommentQueryParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentOrder {
    pub column: &'static str,
    pub descending: bool,
}

impl CommentOrder {
    pub fn parse(sort_by: Option<&str>, order: Option<&str>) -> Result<Self, RequestError> {
        let column = match sort_by.map(str::trim).unwrap_or("createdAt") {
            "id" | "_id" => "id",
            "content" => "content",
            "author" => "author_id",
            "post" => "post_id",
            "createdAt" | "" => "created_at",
            "updatedAt" => "updated_at",
            other => {
                return Err(RequestError::invalid(format!(
                    "Cannot sort comments by '{}'",
                    other
                )))
            }
        };
        let descending = order.map(str::trim).unwrap_or("desc") == "desc";
        Ok(CommentOrder { column, descending })
    }
}

/// Limits for endpoints that take only `limit`.
pub fn bounded_limit(limit: Option<u32>, default_limit: u32) -> Result<i64, RequestError> {
    Ok(PageRequest::new(Some(1), limit, default_limit)?.limit())
}

pub fn parse_status_filter(raw: Option<String>) -> Result<Option<PostStatus>, RequestError> {
    match raw {
        None => Ok(Some(PostStatus::Published)),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => PostStatus::parse(&raw)
            .map(Some)
            .ok_or_else(|| RequestError::invalid(format!("Unknown post status '{}'", raw))),
    }
}

/// Splits a comma separated list, dropping blanks and duplicates while
/// keeping the first-seen order.
pub fn split_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
        if !tags.iter().any(|seen| seen == tag) {
            tags.push(tag.to_owned());
        }
    }
    tags
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
