use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension, Json,
};
use axum_extra::extract::WithRejection;

use crate::{
    authentication::AuthUser,
    bounded_limit,
    db_helpers::{
        create_post_in_db, delete_post_in_db, get_post_in_db, list_posts_in_db,
        posts_by_author_in_db, related_posts_in_db, toggle_like_in_db, trending_posts_in_db,
        update_post_in_db,
    },
    errors::RequestError,
    parse_id, parse_status_filter, AppState, AuthorPostsQueryParams, AuthorPostsWrapper,
    AuthorSummary, Envelope, JsonResponse, LikeWrapper, MultiplePostsWrapper, NoData,
    PageRequest, Pagination, PostForm, PostQueryParams, PostWrapper, RelatedPostsWrapper,
    RelatedQueryParams, TimeFrame, TrendingPostsWrapper, TrendingQueryParams,
};

type JsonResult<T> = Result<Json<Envelope<T>>, RequestError>;
type IdPath = WithRejection<Path<String>, RequestError>;

// ----------------- Post Handlers -----------------
pub async fn list_posts(
    Extension(state): Extension<Arc<AppState>>,
    WithRejection(Query(params), _): WithRejection<Query<PostQueryParams>, RequestError>,
) -> JsonResult<MultiplePostsWrapper> {
    let (filter, page) = params.into_filter()?;
    let (posts, total) = list_posts_in_db(&state.pool, &filter, page).await?;
    Ok(Json(Envelope::wrap(MultiplePostsWrapper {
        posts,
        pagination: Pagination::new(page, total),
    })))
}

pub async fn create_post(
    Extension(state): Extension<Arc<AppState>>,
    AuthUser(author): AuthUser,
    form: PostForm,
) -> Result<JsonResponse<Envelope<PostWrapper>>, RequestError> {
    let (new_post, images) = form.validate_new()?;
    let post = create_post_in_db(&state.pool, state.media.as_ref(), &author, new_post, images).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            PostWrapper { post },
            "Post created successfully",
        )),
    ))
}

pub async fn get_post(
    Extension(state): Extension<Arc<AppState>>,
    WithRejection(Path(id), _): IdPath,
) -> JsonResult<PostWrapper> {
    let id = parse_id(&id, "post")?;
    let post = get_post_in_db(&state.pool, id).await?;
    Ok(Json(Envelope::wrap(PostWrapper { post })))
}

pub async fn update_post(
    Extension(state): Extension<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Path(id), _): IdPath,
    form: PostForm,
) -> JsonResult<PostWrapper> {
    let id = parse_id(&id, "post")?;
    let post = update_post_in_db(&state.pool, state.media.as_ref(), &user, id, form).await?;
    Ok(Json(Envelope::with_message(
        PostWrapper { post },
        "Post updated successfully",
    )))
}

pub async fn delete_post(
    Extension(state): Extension<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Path(id), _): IdPath,
) -> JsonResult<NoData> {
    let id = parse_id(&id, "post")?;
    delete_post_in_db(&state.pool, state.media.as_ref(), &user, id).await?;
    Ok(Json(Envelope::message("Post deleted successfully")))
}

pub async fn toggle_like(
    Extension(state): Extension<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Path(id), _): IdPath,
) -> JsonResult<LikeWrapper> {
    let id = parse_id(&id, "post")?;
    let (likes_count, is_liked) = toggle_like_in_db(&state.pool, id, user.id).await?;
    let message = if is_liked { "Post liked" } else { "Post unliked" };
    Ok(Json(Envelope::with_message(
        LikeWrapper {
            likes_count,
            is_liked,
        },
        message,
    )))
}

pub async fn trending_posts(
    Extension(state): Extension<Arc<AppState>>,
    WithRejection(Query(params), _): WithRejection<Query<TrendingQueryParams>, RequestError>,
) -> JsonResult<TrendingPostsWrapper> {
    let time_frame = TimeFrame::parse(params.time_frame.as_deref())?;
    let limit = bounded_limit(params.limit, 10)?;
    let posts = trending_posts_in_db(&state.pool, time_frame, limit).await?;
    Ok(Json(Envelope::wrap(TrendingPostsWrapper {
        count: posts.len(),
        posts,
        time_frame: time_frame.as_str(),
    })))
}

pub async fn related_posts(
    Extension(state): Extension<Arc<AppState>>,
    WithRejection(Path(id), _): IdPath,
    WithRejection(Query(params), _): WithRejection<Query<RelatedQueryParams>, RequestError>,
) -> JsonResult<RelatedPostsWrapper> {
    let id = parse_id(&id, "post")?;
    let limit = bounded_limit(params.limit, 5)?;
    let posts = related_posts_in_db(&state.pool, id, limit).await?;
    Ok(Json(Envelope::wrap(RelatedPostsWrapper {
        count: posts.len(),
        posts,
    })))
}

pub async fn posts_by_author(
    Extension(state): Extension<Arc<AppState>>,
    WithRejection(Path(author_id), _): IdPath,
    WithRejection(Query(params), _): WithRejection<Query<AuthorPostsQueryParams>, RequestError>,
) -> JsonResult<AuthorPostsWrapper> {
    let author_id = parse_id(&author_id, "author")?;
    let page = PageRequest::new(params.page, params.limit, 10)?;
    let status = parse_status_filter(params.status)?;
    let (author, posts, total) = posts_by_author_in_db(&state.pool, author_id, status, page).await?;
    Ok(Json(Envelope::wrap(AuthorPostsWrapper {
        posts,
        author: AuthorSummary::new(author),
        pagination: Pagination::new(page, total),
    })))
}
