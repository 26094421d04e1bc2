use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use serde::Deserialize;
use validator::ValidateEmail;

use crate::errors::RequestError;
use crate::media::{ImageUpload, MAX_IMAGES_PER_REQUEST, MAX_IMAGE_BYTES};
use crate::models::PostStatus;
use crate::slugify;

use super::{parse_id, split_tags};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;
const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 128;
const BIO_MAX: usize = 500;
const CATEGORY_NAME_MAX: usize = 50;
const CATEGORY_DESCRIPTION_MAX: usize = 200;
const TITLE_MAX: usize = 200;
const EXCERPT_MAX: usize = 500;
const COMMENT_MAX: usize = 1000;

// ----------------- User Request -----------------
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(self) -> Result<NewUser, RequestError> {
        let (Some(username), Some(email), Some(password)) = (
            present(self.username),
            present(self.email),
            self.password.filter(|p| !p.is_empty()),
        ) else {
            return Err(RequestError::invalid("Missing credentials"));
        };
        Ok(NewUser {
            username: validate_username(&username)?,
            email: validate_email(&email)?,
            password: validate_password(password)?,
        })
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    /// Only checks presence; a malformed email simply fails to match.
    pub fn validate(self) -> Result<(String, String), RequestError> {
        match (present(self.email), self.password.filter(|p| !p.is_empty())) {
            (Some(email), Some(password)) => Ok((email.to_lowercase(), password)),
            _ => Err(RequestError::invalid("Missing credentials")),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub bio: Option<String>,
    pub profile_pic: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    /// Still in clear text; hashed by the user service.
    pub password: Option<String>,
    pub bio: Option<String>,
    pub profile_pic: Option<String>,
}

impl UpdateProfileRequest {
    pub fn validate(self) -> Result<ProfileChanges, RequestError> {
        let bio = self.bio.map(|bio| bio.trim().to_owned());
        if let Some(bio) = &bio {
            check_max("Bio", bio, BIO_MAX)?;
        }
        Ok(ProfileChanges {
            username: self.username.as_deref().map(validate_username).transpose()?,
            email: self.email.as_deref().map(validate_email).transpose()?,
            password: self.password.map(validate_password).transpose()?,
            bio,
            profile_pic: self.profile_pic.map(|pic| pic.trim().to_owned()),
        })
    }
}

fn validate_username(raw: &str) -> Result<String, RequestError> {
    let username = raw.trim();
    let length = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&length) {
        return Err(RequestError::invalid(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    Ok(username.to_owned())
}

fn validate_email(raw: &str) -> Result<String, RequestError> {
    let email = raw.trim().to_lowercase();
    if !email.as_str().validate_email() {
        return Err(RequestError::invalid("Please provide a valid email"));
    }
    Ok(email)
}

fn validate_password(password: String) -> Result<String, RequestError> {
    let length = password.chars().count();
    if length < PASSWORD_MIN {
        return Err(RequestError::invalid(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN
        )));
    }
    if length > PASSWORD_MAX {
        return Err(RequestError::invalid(format!(
            "Password must be at most {} characters",
            PASSWORD_MAX
        )));
    }
    Ok(password)
}

// ----------------- Category Request -----------------
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct CategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryChanges {
    pub name: Option<(String, String)>,
    pub description: Option<String>,
}

impl CategoryRequest {
    pub fn validate_new(self) -> Result<NewCategory, RequestError> {
        let name = present(self.name).ok_or_else(|| RequestError::invalid("Category Name is required"))?;
        let (name, slug) = validate_category_name(&name)?;
        let description = validate_category_description(self.description.unwrap_or_default())?;
        Ok(NewCategory {
            name,
            description,
            slug,
        })
    }

    pub fn validate_changes(self) -> Result<CategoryChanges, RequestError> {
        Ok(CategoryChanges {
            name: present(self.name)
                .map(|name| validate_category_name(&name))
                .transpose()?,
            description: self
                .description
                .map(validate_category_description)
                .transpose()?,
        })
    }
}

/// Returns the trimmed name and its slug.
fn validate_category_name(raw: &str) -> Result<(String, String), RequestError> {
    let name = raw.trim().to_owned();
    check_max("Category name", &name, CATEGORY_NAME_MAX)?;
    let slug = slugify(&name);
    if slug.is_empty() {
        return Err(RequestError::invalid(
            "Category name must contain at least one letter or digit",
        ));
    }
    Ok((name, slug))
}

fn validate_category_description(raw: String) -> Result<String, RequestError> {
    let description = raw.trim().to_owned();
    check_max("Description", &description, CATEGORY_DESCRIPTION_MAX)?;
    Ok(description)
}

// ----------------- Post Request -----------------
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum FlexibleId {
    Number(i64),
    Text(String),
}

impl FlexibleId {
    fn resolve(&self, what: &str) -> Result<Option<i64>, RequestError> {
        match self {
            FlexibleId::Number(id) => parse_id(&id.to_string(), what).map(Some),
            FlexibleId::Text(text) if text.trim().is_empty() => Ok(None),
            FlexibleId::Text(text) => parse_id(text, what).map(Some),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Csv(String),
}

impl TagsInput {
    pub fn into_tags(self) -> Vec<String> {
        match self {
            TagsInput::List(list) => split_tags(&list.join(",")),
            TagsInput::Csv(csv) => split_tags(&csv),
        }
    }
}

/// Text fields of a post create or update request.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct PostFields {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<FlexibleId>,
    pub tags: Option<TagsInput>,
    pub status: Option<String>,
}

/// Accepts `application/json` or `multipart/form-data`; only the latter can
/// carry `images`.
#[derive(Debug, Default)]
pub struct PostForm {
    pub fields: PostFields,
    pub images: Vec<ImageUpload>,
}

#[axum::async_trait]
impl<S> FromRequest<S> for PostForm
where
    S: Send + Sync,
{
    type Rejection = RequestError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let Json(fields) = Json::<PostFields>::from_request(req, state).await?;
            return Ok(PostForm {
                fields,
                images: Vec::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state).await?;
        let mut form = PostForm::default();
        let mut tags: Vec<String> = Vec::new();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();
            if name == "images" {
                let file_name = field.file_name().unwrap_or("image").to_owned();
                let content_type = field.content_type().unwrap_or_default().to_owned();
                let bytes = field.bytes().await?;
                let image = ImageUpload {
                    file_name,
                    content_type,
                    bytes,
                };
                form.images.push(image);
                continue;
            }

            let value = field.text().await?;
            match name.as_str() {
                "title" => form.fields.title = Some(value),
                "content" => form.fields.content = Some(value),
                "excerpt" => form.fields.excerpt = Some(value),
                "category" => form.fields.category = Some(FlexibleId::Text(value)),
                "status" => form.fields.status = Some(value),
                "tags" | "tags[]" => tags.push(value),
                _ => tracing::debug!(field = %name, "ignoring unknown form field"),
            }
        }
        if !tags.is_empty() {
            form.fields.tags = Some(TagsInput::Csv(tags.join(",")));
        }
        Ok(form)
    }
}

impl PostForm {
    pub fn validate_new(self) -> Result<(NewPost, Vec<ImageUpload>), RequestError> {
        let post = self.fields.validate_new()?;
        check_images(&self.images)?;
        Ok((post, self.images))
    }

    pub fn validate_changes(self) -> Result<(PostChanges, Vec<ImageUpload>), RequestError> {
        let changes = self.fields.validate_changes()?;
        check_images(&self.images)?;
        Ok((changes, self.images))
    }
}

fn check_images(images: &[ImageUpload]) -> Result<(), RequestError> {
    if images.len() > MAX_IMAGES_PER_REQUEST {
        return Err(RequestError::invalid(format!(
            "At most {} images can be uploaded at once",
            MAX_IMAGES_PER_REQUEST
        )));
    }
    images.iter().try_for_each(check_image)
}

fn check_image(image: &ImageUpload) -> Result<(), RequestError> {
    if !image.content_type.starts_with("image/") {
        return Err(RequestError::invalid("Please upload only image files"));
    }
    if image.bytes.len() > MAX_IMAGE_BYTES {
        return Err(RequestError::invalid(format!(
            "Image {} is larger than 5 MB",
            image.file_name
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub category_id: i64,
    pub tags: Vec<String>,
    pub status: PostStatus,
}

#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    /// New title with its slug.
    pub title: Option<(String, String)>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub category_id: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub status: Option<PostStatus>,
}

impl PostFields {
    pub fn validate_new(self) -> Result<NewPost, RequestError> {
        let title = present(self.title);
        let content = present(self.content);
        let category_id = match &self.category {
            Some(category) => category.resolve("category")?,
            None => None,
        };
        let (Some(title), Some(content), Some(category_id)) = (title, content, category_id) else {
            return Err(RequestError::invalid("Missing Info"));
        };
        let (title, slug) = validate_title(&title)?;
        Ok(NewPost {
            title,
            slug,
            content,
            excerpt: validate_excerpt(self.excerpt.unwrap_or_default())?,
            category_id,
            tags: self.tags.map(TagsInput::into_tags).unwrap_or_default(),
            status: parse_post_status(self.status)?.unwrap_or(PostStatus::Published),
        })
    }

    pub fn validate_changes(self) -> Result<PostChanges, RequestError> {
        let category_id = match &self.category {
            Some(category) => category.resolve("category")?,
            None => None,
        };
        Ok(PostChanges {
            title: present(self.title)
                .map(|title| validate_title(&title))
                .transpose()?,
            content: present(self.content),
            excerpt: self.excerpt.map(validate_excerpt).transpose()?,
            category_id,
            tags: self.tags.map(TagsInput::into_tags),
            status: parse_post_status(self.status)?,
        })
    }
}

fn validate_title(raw: &str) -> Result<(String, String), RequestError> {
    let title = raw.trim().to_owned();
    check_max("Title", &title, TITLE_MAX)?;
    let slug = slugify(&title);
    if slug.is_empty() {
        return Err(RequestError::invalid(
            "Title must contain at least one letter or digit",
        ));
    }
    Ok((title, slug))
}

fn validate_excerpt(raw: String) -> Result<String, RequestError> {
    let excerpt = raw.trim().to_owned();
    check_max("Excerpt", &excerpt, EXCERPT_MAX)?;
    Ok(excerpt)
}

fn parse_post_status(raw: Option<String>) -> Result<Option<PostStatus>, RequestError> {
    match present(raw) {
        None => Ok(None),
        Some(raw) => PostStatus::parse(&raw)
            .map(Some)
            .ok_or_else(|| RequestError::invalid(format!("Unknown post status '{}'", raw))),
    }
}

// ----------------- Comment Request -----------------
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct CommentRequest {
    pub content: Option<String>,
}

impl CommentRequest {
    /// Returns the trimmed content.
    pub fn validate(self) -> Result<String, RequestError> {
        let content =
            present(self.content).ok_or_else(|| RequestError::invalid("Comment content is required"))?;
        check_max("Comment", &content, COMMENT_MAX)?;
        Ok(content)
    }
}

/// Trimmed value, or `None` when missing or blank.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn check_max(label: &str, value: &str, max: usize) -> Result<(), RequestError> {
    if value.chars().count() > max {
        return Err(RequestError::invalid(format!(
            "{} must be at most {} characters",
            label, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.to_owned()),
            email: Some(email.to_owned()),
            password: Some(password.to_owned()),
        }
    }

    #[test]
    fn register_requires_every_field() {
        let request = RegisterRequest {
            username: Some("alice".to_owned()),
            email: None,
            password: Some("secret1".to_owned()),
        };
        assert!(matches!(
            request.validate(),
            Err(RequestError::Validation(message)) if message == "Missing credentials"
        ));
    }

    #[test]
    fn register_normalizes_and_checks_fields() {
        let user = register("  alice ", "Alice@Example.COM", "secret1").validate().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");

        assert!(register("al", "alice@example.com", "secret1").validate().is_err());
        assert!(register(&"a".repeat(31), "alice@example.com", "secret1")
            .validate()
            .is_err());
        assert!(register("alice", "not-an-email", "secret1").validate().is_err());
        assert!(register("alice", "alice@example.com", "12345").validate().is_err());
    }

    #[test]
    fn category_slug_is_derived_from_trimmed_name() {
        let category = CategoryRequest {
            name: Some("  Web Development ".to_owned()),
            description: None,
        }
        .validate_new()
        .unwrap();
        assert_eq!(category.name, "Web Development");
        assert_eq!(category.slug, "web-development");
        assert_eq!(category.description, "");

        let too_long = CategoryRequest {
            name: Some("x".repeat(51)),
            description: None,
        };
        assert!(too_long.validate_new().is_err());
    }

    #[test]
    fn new_post_requires_title_content_and_category() {
        let fields = PostFields {
            title: Some("Hello".to_owned()),
            content: Some("Body".to_owned()),
            ..Default::default()
        };
        assert!(matches!(
            fields.validate_new(),
            Err(RequestError::Validation(message)) if message == "Missing Info"
        ));

        let fields = PostFields {
            title: Some("Hello World".to_owned()),
            content: Some("Body".to_owned()),
            category: Some(FlexibleId::Text("4".to_owned())),
            tags: Some(TagsInput::List(vec!["a".to_owned(), "b".to_owned(), "a".to_owned()])),
            ..Default::default()
        };
        let post = fields.validate_new().unwrap();
        assert_eq!(post.slug, "hello-world");
        assert_eq!(post.category_id, 4);
        assert_eq!(post.tags, vec!["a", "b"]);
        assert_eq!(post.status, PostStatus::Published);
    }

    #[test]
    fn malformed_category_id_in_post_is_rejected() {
        let fields = PostFields {
            title: Some("Hello".to_owned()),
            content: Some("Body".to_owned()),
            category: Some(FlexibleId::Text("tech".to_owned())),
            ..Default::default()
        };
        assert!(matches!(
            fields.validate_new(),
            Err(RequestError::Validation(message)) if message == "Invalid category ID format"
        ));
    }

    #[test]
    fn post_changes_only_carry_supplied_fields() {
        let changes = PostFields {
            title: Some("New Title".to_owned()),
            status: Some("draft".to_owned()),
            ..Default::default()
        }
        .validate_changes()
        .unwrap();
        assert_eq!(
            changes.title,
            Some(("New Title".to_owned(), "new-title".to_owned()))
        );
        assert_eq!(changes.status, Some(PostStatus::Draft));
        assert!(changes.content.is_none());
        assert!(changes.tags.is_none());
    }

    #[test]
    fn comment_content_is_trimmed_and_bounded() {
        let content = CommentRequest {
            content: Some("  nice post ".to_owned()),
        }
        .validate()
        .unwrap();
        assert_eq!(content, "nice post");

        let blank = CommentRequest {
            content: Some("   ".to_owned()),
        };
        assert!(blank.validate().is_err());

        let long = CommentRequest {
            content: Some("x".repeat(1001)),
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn images_must_be_small_images() {
        let mut image = ImageUpload {
            file_name: "a.txt".to_owned(),
            content_type: "text/plain".to_owned(),
            bytes: axum::body::Bytes::from_static(b"hi"),
        };
        assert!(check_image(&image).is_err());
        image.content_type = "image/png".to_owned();
        assert!(check_image(&image).is_ok());

        let too_many = vec![image; MAX_IMAGES_PER_REQUEST + 1];
        assert!(check_images(&too_many).is_err());
        assert!(check_images(&too_many[..MAX_IMAGES_PER_REQUEST]).is_ok());
    }
}
