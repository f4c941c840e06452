use crate::error::AppError;
use crate::middleware::User;
use crate::services::UnreadWatcher;
use crate::state::AppState;
use actix_web::{get, http::header, post, web, HttpResponse};
use futures::stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

/// POST /api/v1/conversations/{id}/messages
#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .send(path.into_inner(), user.id, &body.content)
        .await?;
    Ok(HttpResponse::Created().json(message))
}

/// POST /api/v1/conversations/{id}/read
#[post("/conversations/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state.messages.mark_read(path.into_inner(), user.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/v1/me/unread-count
#[get("/me/unread-count")]
pub async fn unread_count(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let unread_count = state.unread.count(Some(user.id)).await?;
    Ok(HttpResponse::Ok().json(UnreadCountResponse { unread_count }))
}

/// Live unread count as server-sent events
/// GET /api/v1/me/unread-count/stream
///
/// Each connection owns one watcher. It lives inside the response body and is
/// dropped with it when the client disconnects.
#[get("/me/unread-count/stream")]
pub async fn unread_count_stream(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let watcher = UnreadWatcher::start(state.unread.clone(), &state.feed, user.id).await?;
    let initial = watcher.current();
    tracing::debug!(user_id = %user.id, unread = initial, "unread stream opened");

    let frames = stream::unfold((watcher, Some(initial)), |(mut watcher, pending)| async move {
        let count = match pending {
            Some(count) => count,
            None => watcher.changed().await?,
        };
        Some((Ok::<_, AppError>(unread_frame(count)), (watcher, None)))
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(frames))
}

fn unread_frame(count: i64) -> web::Bytes {
    let data = serde_json::json!({ "unread_count": count });
    web::Bytes::from(format!("event: unread\ndata: {data}\n\n"))
}
