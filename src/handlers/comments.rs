use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension, Json,
};
use axum_extra::extract::WithRejection;

use crate::{
    authentication::AuthUser,
    db_helpers::{
        add_comment_in_db, delete_comment_in_db, get_comment_in_db, list_comments_by_user_in_db,
        list_comments_for_post_in_db, update_comment_in_db,
    },
    errors::RequestError,
    parse_id, AppState, AuthorSummary, CommentOrder, CommentQueryParams, CommentRequest,
    CommentWrapper, Envelope, JsonResponse, MultipleCommentsWrapper, NoData, PageQueryParams,
    PageRequest, Pagination, UserCommentsWrapper,
};

type JsonResult<T> = Result<Json<Envelope<T>>, RequestError>;
type IdPath = WithRejection<Path<String>, RequestError>;
type CommentBody = WithRejection<Json<CommentRequest>, RequestError>;

// ----------------- Comment Handlers -----------------
pub async fn list_comments_for_post(
    Extension(state): Extension<Arc<AppState>>,
    WithRejection(Path(post_id), _): IdPath,
    WithRejection(Query(params), _): WithRejection<Query<CommentQueryParams>, RequestError>,
) -> JsonResult<MultipleCommentsWrapper> {
    let post_id = parse_id(&post_id, "post")?;
    let page = PageRequest::new(params.page, params.limit, 20)?;
    let order = CommentOrder::parse(params.sort_by.as_deref(), params.order.as_deref())?;
    let (comments, total) = list_comments_for_post_in_db(&state.pool, post_id, order, page).await?;
    Ok(Json(Envelope::wrap(MultipleCommentsWrapper {
        comments,
        pagination: Pagination::new(page, total),
    })))
}

pub async fn add_comment(
    Extension(state): Extension<Arc<AppState>>,
    AuthUser(author): AuthUser,
    WithRejection(Path(post_id), _): IdPath,
    WithRejection(Json(request), _): CommentBody,
) -> Result<JsonResponse<Envelope<CommentWrapper>>, RequestError> {
    let post_id = parse_id(&post_id, "post")?;
    let content = request.validate()?;
    let comment = add_comment_in_db(&state.pool, post_id, &author, content).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            CommentWrapper { comment },
            "Comment added successfully",
        )),
    ))
}

pub async fn get_comment(
    Extension(state): Extension<Arc<AppState>>,
    WithRejection(Path(id), _): IdPath,
) -> JsonResult<CommentWrapper> {
    let id = parse_id(&id, "comment")?;
    let comment = get_comment_in_db(&state.pool, id).await?;
    Ok(Json(Envelope::wrap(CommentWrapper { comment })))
}

pub async fn update_comment(
    Extension(state): Extension<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Path(id), _): IdPath,
    WithRejection(Json(request), _): CommentBody,
) -> JsonResult<CommentWrapper> {
    let id = parse_id(&id, "comment")?;
    let comment = update_comment_in_db(&state.pool, id, &user, request).await?;
    Ok(Json(Envelope::with_message(
        CommentWrapper { comment },
        "Comment updated successfully",
    )))
}

pub async fn delete_comment(
    Extension(state): Extension<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Path(id), _): IdPath,
) -> JsonResult<NoData> {
    let id = parse_id(&id, "comment")?;
    delete_comment_in_db(&state.pool, id, &user).await?;
    Ok(Json(Envelope::message("Comment deleted successfully")))
}

pub async fn list_comments_by_user(
    Extension(state): Extension<Arc<AppState>>,
    WithRejection(Path(user_id), _): IdPath,
    WithRejection(Query(params), _): WithRejection<Query<PageQueryParams>, RequestError>,
) -> JsonResult<UserCommentsWrapper> {
    let user_id = parse_id(&user_id, "user")?;
    let page = PageRequest::new(params.page, params.limit, 20)?;
    let (user, comments, total) = list_comments_by_user_in_db(&state.pool, user_id, page).await?;
    Ok(Json(Envelope::wrap(UserCommentsWrapper {
        comments,
        user: AuthorSummary::new(user),
        pagination: Pagination::new(page, total),
    })))
}
