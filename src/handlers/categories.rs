use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension, Json,
};
use axum_extra::extract::WithRejection;

use crate::{
    authentication::AdminUser,
    db_helpers::{
        create_category_in_db, delete_category_in_db, get_category_in_db, list_categories_in_db,
        update_category_in_db,
    },
    errors::RequestError,
    parse_id, AppState, CategoryQueryParams, CategoryRequest, CategoryResponse, CategoryWrapper,
    Envelope, JsonResponse, MultipleCategoriesWrapper, NoData, PageRequest, Pagination,
};

type JsonResult<T> = Result<Json<Envelope<T>>, RequestError>;
type CategoryBody = WithRejection<Json<CategoryRequest>, RequestError>;

// ----------------- Category Handlers -----------------
pub async fn list_categories(
    Extension(state): Extension<Arc<AppState>>,
    WithRejection(Query(params), _): WithRejection<Query<CategoryQueryParams>, RequestError>,
) -> JsonResult<MultipleCategoriesWrapper> {
    let page = PageRequest::new(params.page, params.limit, 20)?;
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|search| !search.is_empty());
    let (categories, total) = list_categories_in_db(&state.pool, search, page).await?;
    Ok(Json(Envelope::wrap(MultipleCategoriesWrapper {
        categories: categories.into_iter().map(CategoryResponse::new).collect(),
        pagination: Pagination::new(page, total),
    })))
}

pub async fn create_category(
    Extension(state): Extension<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    WithRejection(Json(request), _): CategoryBody,
) -> Result<JsonResponse<Envelope<CategoryWrapper>>, RequestError> {
    let new_category = request.validate_new()?;
    let category = create_category_in_db(&state.pool, new_category).await?;
    tracing::debug!(admin_id = admin.id, category_id = category.id, "category created by admin");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            CategoryWrapper {
                category: CategoryResponse::new(category),
            },
            "Category created successfully",
        )),
    ))
}

pub async fn get_category(
    Extension(state): Extension<Arc<AppState>>,
    WithRejection(Path(identifier), _): WithRejection<Path<String>, RequestError>,
) -> JsonResult<CategoryWrapper> {
    let category = get_category_in_db(&state.pool, &identifier).await?;
    Ok(Json(Envelope::wrap(CategoryWrapper {
        category: CategoryResponse::new(category),
    })))
}

pub async fn update_category(
    Extension(state): Extension<Arc<AppState>>,
    AdminUser(_): AdminUser,
    WithRejection(Path(id), _): WithRejection<Path<String>, RequestError>,
    WithRejection(Json(request), _): CategoryBody,
) -> JsonResult<CategoryWrapper> {
    let id = parse_id(&id, "category")?;
    let changes = request.validate_changes()?;
    let category = update_category_in_db(&state.pool, id, changes).await?;
    Ok(Json(Envelope::with_message(
        CategoryWrapper {
            category: CategoryResponse::new(category),
        },
        "Category updated successfully",
    )))
}

pub async fn delete_category(
    Extension(state): Extension<Arc<AppState>>,
    AdminUser(_): AdminUser,
    WithRejection(Path(id), _): WithRejection<Path<String>, RequestError>,
) -> JsonResult<NoData> {
    let id = parse_id(&id, "category")?;
    delete_category_in_db(&state.pool, id).await?;
    Ok(Json(Envelope::message("Category deleted successfully")))
}
