//! Report filing and staff handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Duration;
use serde::Deserialize;
use tracing::instrument;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::account_service::CurrentUser;
use crate::error::{AppError, run_blocking};
use crate::moderation_service::ActionRequest;
use crate::pagination::Page;
use crate::state::AppState;
use crate::views::{
    AdminUserView, LiftRequest, ReportRequest, ReportView, RoleChange, TargetSnapshot,
};
use crate::{ModerationLogEntry, ReportStatus, TargetKind, utc_now};

/// Query string of `GET /api/admin/moderation`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ReportListQuery {
    status: Option<ReportStatus>,
    page: Option<i64>,
    per_page: Option<i64>,
}

/// Query string of `GET /api/admin/users`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct UserListQuery {
    q: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

/// Query string of `GET /api/admin/moderation/log`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LogQuery {
    limit: Option<i64>,
}

#[instrument(skip_all, fields(user_id = current.id(), target = %body.target_type, target_id = body.target_id))]
pub(crate) async fn file_report(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<ReportRequest>,
) -> Result<(StatusCode, Json<ReportView>), AppError> {
    let moderation = state.moderation.clone();
    let report = run_blocking(move || {
        moderation.report(&current.user, body.target_type, body.target_id, &body.reason)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub(crate) async fn list_reports(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(query): ApiQuery<ReportListQuery>,
) -> Result<Json<Page<ReportView>>, AppError> {
    let moderation = state.moderation.clone();
    Ok(Json(
        run_blocking(move || {
            moderation.list_reports(&current.user, query.status, query.page, query.per_page)
        })
        .await?,
    ))
}

pub(crate) async fn get_report(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(report_id): ApiPath<i32>,
) -> Result<Json<ReportView>, AppError> {
    let moderation = state.moderation.clone();
    Ok(Json(
        run_blocking(move || moderation.get_report(&current.user, report_id)).await?,
    ))
}

#[instrument(skip_all, fields(user_id = current.id(), report_id = report_id, action = %request.action))]
pub(crate) async fn act_on_report(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(report_id): ApiPath<i32>,
    ApiJson(request): ApiJson<ActionRequest>,
) -> Result<Json<ReportView>, AppError> {
    let moderation = state.moderation.clone();
    Ok(Json(
        run_blocking(move || moderation.act(&current.user, report_id, request)).await?,
    ))
}

pub(crate) async fn moderation_log(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> Result<Json<Vec<ModerationLogEntry>>, AppError> {
    let moderation = state.moderation.clone();
    Ok(Json(
        run_blocking(move || moderation.log(&current.user, query.limit)).await?,
    ))
}

pub(crate) async fn list_users(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<Json<Page<AdminUserView>>, AppError> {
    let moderation = state.moderation.clone();
    let window = Duration::seconds(*state.config.chat().online_window_secs());
    Ok(Json(
        run_blocking(move || {
            moderation.list_users(
                &current.user,
                query.q.as_deref(),
                query.page,
                query.per_page,
                window,
            )
        })
        .await?,
    ))
}

#[instrument(skip_all, fields(user_id = current.id(), target_user = user_id, role = %body.role))]
pub(crate) async fn set_role(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(user_id): ApiPath<i32>,
    ApiJson(body): ApiJson<RoleChange>,
) -> Result<Json<AdminUserView>, AppError> {
    let moderation = state.moderation.clone();
    let user = run_blocking(move || moderation.set_role(&current.user, user_id, body.role)).await?;
    let online = state.accounts.is_online(&user);
    Ok(Json(AdminUserView::from_user(&user, utc_now(), online)))
}

#[instrument(skip_all, fields(user_id = current.id(), target_user = user_id, sanction = %body.sanction))]
pub(crate) async fn lift_sanction(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(user_id): ApiPath<i32>,
    ApiJson(body): ApiJson<LiftRequest>,
) -> Result<Json<AdminUserView>, AppError> {
    let moderation = state.moderation.clone();
    let user = run_blocking(move || moderation.lift(&current.user, user_id, body.sanction)).await?;
    let online = state.accounts.is_online(&user);
    Ok(Json(AdminUserView::from_user(&user, utc_now(), online)))
}

#[instrument(skip_all, fields(user_id = current.id(), target = %kind, target_id = target_id))]
pub(crate) async fn restore_content(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((kind, target_id)): ApiPath<(TargetKind, i32)>,
) -> Result<Json<TargetSnapshot>, AppError> {
    let moderation = state.moderation.clone();
    Ok(Json(
        run_blocking(move || moderation.restore(&current.user, kind, target_id)).await?,
    ))
}
