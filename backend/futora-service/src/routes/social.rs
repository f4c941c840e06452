use crate::error::AppError;
use crate::middleware::User;
use crate::state::AppState;
use actix_web::{delete, get, post, web, HttpResponse};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct MutualFollowersResponse {
    pub count: u64,
}

/// POST /api/v1/follows/{user_id}
#[post("/follows/{user_id}")]
pub async fn follow_user(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let created = state.follows.follow(user.id, path.into_inner()).await?;

    if created {
        Ok(HttpResponse::Created().json(serde_json::json!({ "success": true })))
    } else {
        Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
    }
}

/// DELETE /api/v1/follows/{user_id}
#[delete("/follows/{user_id}")]
pub async fn unfollow_user(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state.follows.unfollow(user.id, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/v1/users/{a}/mutual-followers/{b}
#[get("/users/{a}/mutual-followers/{b}")]
pub async fn mutual_followers(
    state: web::Data<AppState>,
    _user: User,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (a, b) = path.into_inner();
    let count = state.mutual_followers.count(Some(a), Some(b)).await?;
    Ok(HttpResponse::Ok().json(MutualFollowersResponse { count }))
}
