use crate::error::AppError;
use crate::middleware::User;
use crate::models::Participant;
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ResolveDirectRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ParticipantsResponse {
    pub conversation_id: Uuid,
    pub participants: Vec<Participant>,
}

/// Find or create the direct conversation with another user
/// POST /api/v1/conversations/direct
///
/// 204 when the target is the caller.
#[post("/conversations/direct")]
pub async fn resolve_direct(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<ResolveDirectRequest>,
) -> Result<HttpResponse, AppError> {
    match state.resolver.resolve(user.id, body.user_id).await? {
        Some(resolution) => Ok(HttpResponse::Ok().json(resolution)),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

/// GET /api/v1/conversations/{id}/participants
#[get("/conversations/{id}/participants")]
pub async fn get_participants(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = path.into_inner();
    let participants = state.resolver.participants(conversation_id, user.id).await?;

    Ok(HttpResponse::Ok().json(ParticipantsResponse {
        conversation_id,
        participants,
    }))
}
