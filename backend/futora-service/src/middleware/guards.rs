//! Caller identity extraction.
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id in `x-user-id`.

use crate::error::AppError;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

impl FromRequest for User {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok());

        ready(id.map(|id| User { id }).ok_or(AppError::Unauthorized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_rt::test]
    async fn test_extracts_user_id() {
        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, id.to_string()))
            .to_http_request();

        let user = User::extract(&req).await.unwrap();
        assert_eq!(user.id, id);
    }

    #[actix_rt::test]
    async fn test_missing_or_invalid_header() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(User::extract(&req).await, Err(AppError::Unauthorized)));

        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "not-a-uuid"))
            .to_http_request();
        assert!(matches!(User::extract(&req).await, Err(AppError::Unauthorized)));
    }
}
