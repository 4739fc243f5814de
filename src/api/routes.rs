use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// Routes are mounted at the root so peers can fetch `http://{peer}/chain`.
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/mine", web::get().to(handlers::mine_block))
        .route("/chain", web::get().to(handlers::get_chain))
        .route("/validate", web::get().to(handlers::validate_chain))
        .route("/transactions/new", web::post().to(handlers::new_transaction))
        .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
        .route("/nodes/register", web::post().to(handlers::register_nodes))
        .route("/nodes/resolve", web::get().to(handlers::resolve_conflicts));
}
