// API module
//
// This module contains the HTTP layer of the node

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use routes::configure_routes;
