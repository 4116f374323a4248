//! HTTP gateway that stores entity photos in an S3-compatible bucket.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use axum::{Router, extract::FromRef};
use services::{file_service::FileService, token_service::TokenValidator};
use std::sync::Arc;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub files: FileService,
    /// Bearer-token check for the file routes; `None` leaves them open.
    pub auth: Option<Arc<dyn TokenValidator>>,
}

impl FromRef<AppState> for FileService {
    fn from_ref(state: &AppState) -> Self {
        state.files.clone()
    }
}

/// Build the application router.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    routes::routes::routes(state, max_upload_bytes)
}
