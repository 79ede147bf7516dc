//! HTTP server and routes.

mod handlers;
mod state;

pub use state::{AppState, BookSummary};

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/books", get(handlers::list_books))
        .route("/books/import", post(handlers::import_book))
        .route("/books/{id}", get(handlers::book_detail))
        .route("/books/{id}/chapters/{index}", get(handlers::book_chapter));

    let export_routes = Router::new()
        .route("/{id}/markdown", get(handlers::export_markdown))
        .route("/{id}/pdf", get(handlers::export_pdf));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/books/{id}/images/{name}", get(handlers::book_image))
        .nest("/api", api_routes)
        .nest("/export", export_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
