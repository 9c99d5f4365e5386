//! Subject, reviewer and flashcard handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::instrument;

use super::auth::MaybeUser;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::account_service::CurrentUser;
use crate::error::{AppError, run_blocking};
use crate::pagination::Page;
use crate::reviewer_service::{ReviewerDraft, ReviewerEdit};
use crate::state::AppState;
use crate::views::{CreateSubject, FlashcardView, ReviewerDetail, ReviewerSummary, SubjectView};
use crate::ReviewerFilter;

/// Query string of `GET /api/reviewers`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ReviewerListQuery {
    subject_id: Option<i32>,
    author_id: Option<i32>,
    q: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

pub(crate) async fn list_subjects(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubjectView>>, AppError> {
    let reviewers = state.reviewers.clone();
    Ok(Json(run_blocking(move || reviewers.list_subjects()).await?))
}

pub(crate) async fn get_subject(
    State(state): State<AppState>,
    ApiPath(subject_id): ApiPath<i32>,
) -> Result<Json<SubjectView>, AppError> {
    let reviewers = state.reviewers.clone();
    Ok(Json(run_blocking(move || reviewers.get_subject(subject_id)).await?))
}

#[instrument(skip_all, fields(user_id = current.id()))]
pub(crate) async fn create_subject(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<CreateSubject>,
) -> Result<(StatusCode, Json<SubjectView>), AppError> {
    let reviewers = state.reviewers.clone();
    let subject = run_blocking(move || {
        reviewers.create_subject(&current.user, &body.name, body.description)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(subject)))
}

#[instrument(skip_all, fields(user_id = current.id()))]
pub(crate) async fn delete_subject(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(subject_id): ApiPath<i32>,
) -> Result<StatusCode, AppError> {
    let reviewers = state.reviewers.clone();
    run_blocking(move || reviewers.delete_subject(&current.user, subject_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
pub(crate) async fn list_reviewers(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiQuery(query): ApiQuery<ReviewerListQuery>,
) -> Result<Json<Page<ReviewerSummary>>, AppError> {
    let reviewers = state.reviewers.clone();
    let page = reviewers.page_request(query.page, query.per_page);
    let filter = ReviewerFilter {
        subject_id: query.subject_id,
        author_id: query.author_id,
        query: query.q,
        include_hidden: false,
    };
    let listing =
        run_blocking(move || reviewers.list_reviewers(filter, page, viewer.user())).await?;
    Ok(Json(listing))
}

pub(crate) async fn get_reviewer(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiPath(reviewer_id): ApiPath<i32>,
) -> Result<Json<ReviewerDetail>, AppError> {
    let reviewers = state.reviewers.clone();
    Ok(Json(
        run_blocking(move || reviewers.get_reviewer(reviewer_id, viewer.user())).await?,
    ))
}

pub(crate) async fn list_flashcards(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiPath(reviewer_id): ApiPath<i32>,
) -> Result<Json<Vec<FlashcardView>>, AppError> {
    let reviewers = state.reviewers.clone();
    Ok(Json(
        run_blocking(move || reviewers.flashcards(reviewer_id, viewer.user())).await?,
    ))
}

#[instrument(skip_all, fields(user_id = current.id()))]
pub(crate) async fn create_reviewer(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(draft): ApiJson<ReviewerDraft>,
) -> Result<(StatusCode, Json<ReviewerDetail>), AppError> {
    let reviewers = state.reviewers.clone();
    let detail = run_blocking(move || reviewers.create_reviewer(&current.user, draft)).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[instrument(skip_all, fields(user_id = current.id()))]
pub(crate) async fn update_reviewer(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(reviewer_id): ApiPath<i32>,
    ApiJson(edit): ApiJson<ReviewerEdit>,
) -> Result<Json<ReviewerDetail>, AppError> {
    let reviewers = state.reviewers.clone();
    Ok(Json(
        run_blocking(move || reviewers.update_reviewer(&current.user, reviewer_id, edit)).await?,
    ))
}

#[instrument(skip_all, fields(user_id = current.id()))]
pub(crate) async fn delete_reviewer(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(reviewer_id): ApiPath<i32>,
) -> Result<StatusCode, AppError> {
    let reviewers = state.reviewers.clone();
    run_blocking(move || reviewers.delete_reviewer(&current.user, reviewer_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
