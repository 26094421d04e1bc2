use std::sync::Arc;

use axum::{http::StatusCode, Extension, Json};
use axum_extra::extract::{CookieJar, WithRejection};

use crate::{
    authentication::{
        get_jwt_token, removal_cookie, session_cookie, verify_password_argon2, AuthUser,
    },
    db_helpers::{get_credentials_by_email, insert_user, update_user_in_db},
    errors::RequestError,
    models::{Role, User},
    AppState, AuthWrapper, Envelope, LoginRequest, NoData, RegisterRequest, UpdateProfileRequest,
    UserResponse, UserWrapper,
};

type SessionResponse = (StatusCode, CookieJar, Json<Envelope<AuthWrapper>>);

/// Signs a token for `user` and stores it in the session cookie.
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
    status: StatusCode,
) -> Result<SessionResponse, RequestError> {
    let ttl = state.config.token_ttl;
    let token = get_jwt_token(user.id, &state.config.jwt_secret, ttl)?;
    let jar = jar.add(session_cookie(
        token.clone(),
        ttl,
        state.config.secure_cookies,
    ));
    Ok((
        status,
        jar,
        Json(Envelope::wrap(AuthWrapper {
            user: UserResponse::new(user),
            token,
        })),
    ))
}

// ----------------- User Handlers -----------------
pub async fn register_user(
    Extension(state): Extension<Arc<AppState>>,
    jar: CookieJar,
    WithRejection(Json(request), _): WithRejection<Json<RegisterRequest>, RequestError>,
) -> Result<SessionResponse, RequestError> {
    let new_user = request.validate()?;
    let user = insert_user(&state.pool, new_user, Role::User).await?;
    start_session(&state, jar, user, StatusCode::CREATED)
}

pub async fn login_user(
    Extension(state): Extension<Arc<AppState>>,
    jar: CookieJar,
    WithRejection(Json(request), _): WithRejection<Json<LoginRequest>, RequestError>,
) -> Result<SessionResponse, RequestError> {
    let (email, password) = request.validate()?;

    let Some(credentials) = get_credentials_by_email(&state.pool, &email).await? else {
        tracing::debug!("login attempt for unknown email");
        return Err(RequestError::NotAuthorized("Invalid credentials"));
    };
    if !verify_password_argon2(password, credentials.password).await? {
        tracing::debug!(user_id = credentials.user.id, "login attempt with wrong password");
        return Err(RequestError::NotAuthorized("Invalid credentials"));
    }

    tracing::info!(user_id = credentials.user.id, "user logged in");
    start_session(&state, jar, credentials.user, StatusCode::OK)
}

pub async fn logout_user(
    AuthUser(user): AuthUser,
    jar: CookieJar,
) -> (CookieJar, Json<Envelope<NoData>>) {
    tracing::info!(user_id = user.id, "user logged out");
    (
        jar.add(removal_cookie()),
        Json(Envelope::message("Logged Out Successfully")),
    )
}

pub async fn get_current_user(AuthUser(user): AuthUser) -> Json<Envelope<UserWrapper>> {
    Json(Envelope::wrap(UserWrapper {
        user: UserResponse::new(user),
    }))
}

pub async fn update_current_user(
    Extension(state): Extension<Arc<AppState>>,
    AuthUser(user): AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<UpdateProfileRequest>, RequestError>,
) -> Result<Json<Envelope<UserWrapper>>, RequestError> {
    let changes = request.validate()?;
    let user = update_user_in_db(&state.pool, user.id, changes).await?;
    Ok(Json(Envelope::with_message(
        UserWrapper {
            user: UserResponse::new(user),
        },
        "Profile updated successfully",
    )))
}
