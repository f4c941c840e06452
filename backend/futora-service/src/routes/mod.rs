use actix_web::web;

pub mod conversations;
pub mod messages;
pub mod social;

/// Register every endpoint; shared by the server and the route tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(conversations::resolve_direct)
            .service(conversations::get_participants)
            .service(messages::send_message)
            .service(messages::mark_read)
            .service(messages::unread_count)
            .service(messages::unread_count_stream)
            .service(social::follow_user)
            .service(social::unfollow_user)
            .service(social::mutual_followers),
    )
    .route("/health", web::get().to(|| async { "OK" }));
}
