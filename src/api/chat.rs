//! Chat handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::instrument;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::account_service::CurrentUser;
use crate::chat_service::MessageQuery;
use crate::error::{AppError, run_blocking};
use crate::state::AppState;
use crate::views::{MessageView, SendMessage};

pub(crate) async fn list_messages(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(query): ApiQuery<MessageQuery>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    let chat = state.chat.clone();
    Ok(Json(run_blocking(move || chat.list(&current.user, query)).await?))
}

#[instrument(skip_all, fields(user_id = current.id(), recipient_id = body.recipient_id))]
pub(crate) async fn send_message(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<SendMessage>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    let chat = state.chat.clone();
    let message =
        run_blocking(move || chat.send(&current.user, &body.body, body.recipient_id)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[instrument(skip_all, fields(user_id = current.id()))]
pub(crate) async fn delete_message(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(message_id): ApiPath<i32>,
) -> Result<StatusCode, AppError> {
    let chat = state.chat.clone();
    run_blocking(move || chat.delete(&current.user, message_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
