// src/main.rs

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod csrf;
mod errors;
mod formset;
mod handlers;
mod htmx_handlers;
mod marcas;
mod models;
mod notify;
mod products;
mod response;
mod state;

use crate::handlers::*;
use crate::htmx_handlers::*;
use crate::state::{AdminConfig, AppState};

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Inicjalizacja systemu logowania (tracing)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shop_admin_forms=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Inicjalizacja serwera...");

    let config = match AdminConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Błędna konfiguracja: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Backend: {}", config.backend_url);

    let addr = config.bind_addr;
    let app_state = match AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("Nie można zainicjalizować stanu aplikacji: {}", e);
            std::process::exit(1);
        }
    };

    let app = Router::new()
        .route("/admin/productos/nuevo", get(new_product_page_handler))
        .route(
            "/admin/productos/{id}/editar",
            get(edit_product_page_handler),
        )
        .route("/admin/productos/guardar", post(save_product_handler))
        .route(
            "/htmx/admin/formset/{prefix}/add",
            post(formset_add_htmx_handler),
        )
        .route(
            "/htmx/admin/formset/{prefix}/remove/{index}",
            post(formset_remove_htmx_handler),
        )
        .route(
            "/htmx/admin/formset/{prefix}/restore/{index}",
            post(formset_restore_htmx_handler),
        )
        .route(
            "/htmx/admin/formset/{prefix}/principal/{index}",
            post(formset_principal_htmx_handler),
        )
        .route(
            "/htmx/admin/marcas",
            get(marca_panel_htmx_handler).post(create_marca_htmx_handler),
        )
        .route(
            "/htmx/admin/marcas/{id}/eliminar",
            post(delete_marca_htmx_handler),
        )
        .route(
            "/htmx/admin/marcas/{id}/wybierz",
            post(select_marca_htmx_handler),
        )
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .with_state(app_state);

    tracing::info!("Serwer nasłuchuje na {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Nie można powiązać adresu {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        tracing::error!("Błąd serwera: {}", e);
    }
}
