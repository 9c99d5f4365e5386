//! Registration, login, profile and presence handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{info, instrument};

use super::auth::{expired_session_cookie, session_cookie};
use super::extract::{ApiJson, ApiPath};
use crate::account_service::CurrentUser;
use crate::error::{AppError, run_blocking};
use crate::state::AppState;
use crate::views::{
    AccountView, AuthResponse, LoginRequest, OnlineUser, PasswordChange, ProfileUpdate,
    RegisterRequest, UserView,
};
use crate::{Session, User, Warning, utc_now};

fn auth_response(status: StatusCode, user: &User, session: &Session) -> Response {
    let max_age = (*session.expires_at() - *session.created_at()).num_seconds();
    let body = AuthResponse {
        token: session.token().clone(),
        expires_at: *session.expires_at(),
        user: AccountView::from_user(user, utc_now()),
    };
    (
        status,
        [(header::SET_COOKIE, session_cookie(session.token(), max_age))],
        Json(body),
    )
        .into_response()
}

#[instrument(skip(state, body), fields(username = %body.username))]
pub(crate) async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<Response, AppError> {
    let accounts = state.accounts.clone();
    let (user, session) = run_blocking(move || {
        accounts.register(&body.username, &body.password, body.display_name, body.email)
    })
    .await?;
    Ok(auth_response(StatusCode::CREATED, &user, &session))
}

#[instrument(skip(state, body), fields(username = %body.username))]
pub(crate) async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Response, AppError> {
    let accounts = state.accounts.clone();
    let (user, session) =
        run_blocking(move || accounts.login(&body.username, &body.password)).await?;
    Ok(auth_response(StatusCode::OK, &user, &session))
}

#[instrument(skip_all, fields(user_id = current.id()))]
pub(crate) async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response, AppError> {
    let accounts = state.accounts.clone();
    let token = current.token.clone();
    run_blocking(move || accounts.logout(&token)).await?;
    info!("Logged out");
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, expired_session_cookie())],
    )
        .into_response())
}

pub(crate) async fn me(current: CurrentUser) -> Json<AccountView> {
    Json(AccountView::from_user(&current.user, utc_now()))
}

#[instrument(skip_all, fields(user_id = current.id()))]
pub(crate) async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<ProfileUpdate>,
) -> Result<Json<AccountView>, AppError> {
    let accounts = state.accounts.clone();
    let user_id = current.id();
    let user =
        run_blocking(move || accounts.update_profile(user_id, body.display_name, body.bio))
            .await?;
    Ok(Json(AccountView::from_user(&user, utc_now())))
}

#[instrument(skip_all, fields(user_id = current.id()))]
pub(crate) async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<PasswordChange>,
) -> Result<StatusCode, AppError> {
    let accounts = state.accounts.clone();
    run_blocking(move || {
        accounts.change_password(&current, &body.current_password, &body.new_password)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, fields(user_id = current.id()))]
pub(crate) async fn upload_avatar(
    State(state): State<AppState>,
    current: CurrentUser,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AccountView>, AppError> {
    let body = body?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let user = state
        .accounts
        .set_avatar(current.id(), body.to_vec(), content_type, state.files.as_ref())
        .await?;
    Ok(Json(AccountView::from_user(&user, utc_now())))
}

pub(crate) async fn my_warnings(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<Warning>>, AppError> {
    let accounts = state.accounts.clone();
    let user_id = current.id();
    Ok(Json(run_blocking(move || accounts.warnings(user_id)).await?))
}

pub(crate) async fn heartbeat(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<StatusCode, AppError> {
    let accounts = state.accounts.clone();
    let user_id = current.id();
    run_blocking(move || accounts.heartbeat(user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn online(
    State(state): State<AppState>,
) -> Result<Json<Vec<OnlineUser>>, AppError> {
    let accounts = state.accounts.clone();
    Ok(Json(run_blocking(move || accounts.online_users()).await?))
}

pub(crate) async fn user_profile(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<i32>,
) -> Result<Json<UserView>, AppError> {
    let accounts = state.accounts.clone();
    Ok(Json(run_blocking(move || accounts.profile(user_id)).await?))
}
