use actix_web::{error, web, HttpResponse};

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(
        web::scope("/api/v1")
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/mine/jobs", web::post().to(handlers::start_mining_job))
            .route("/mine/jobs/{job_id}", web::get().to(handlers::get_mining_job))
            .route("/mine/jobs/{job_id}", web::delete().to(handlers::cancel_mining_job))
            .route("/data/add", web::post().to(handlers::add_data))
            .route("/pending", web::get().to(handlers::get_pending))
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/block/get", web::post().to(handlers::get_block))
            .route("/node", web::get().to(handlers::get_node)),
    );
}

/// Malformed or incomplete JSON bodies become a 400 with a JSON error
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Invalid Request",
            "detail": err.to_string(),
        }));
        error::InternalError::from_response(err, response).into()
    })
}
