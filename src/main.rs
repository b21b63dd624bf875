use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use ledger_backend::config::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    let app_state = match AppState::new().await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("🔥 Falha ao montar o estado da aplicação: {:?}", e);
            std::process::exit(1);
        }
    };

    // A camada de API fica fora do núcleo; o binário só expõe o health check
    // e mantém o gráfico de serviços vivo.
    let app = Router::new()
        .route("/api/health", get(health_check_handler))
        .with_state(app_state);

    let addr = "0.0.0.0:8000";
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("🔥 Falha ao iniciar o listener TCP: {:?}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("🚀 Servidor escutando em {}", addr);

    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        tracing::error!("🔥 Servidor encerrou com erro: {:?}", e);
        std::process::exit(1);
    }
}

async fn health_check_handler() -> (StatusCode, Json<Value>) {
    let response = json!({ "status": "ok" });
    (StatusCode::OK, Json(response))
}
