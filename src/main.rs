mod admin;
mod app;
mod auth;
mod config;
mod error;
mod importer;
mod state;
mod trainees;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "trainee_portal=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    if let Some(seed) = &app_state.config.admin_seed {
        auth::services::seed_admin(app_state.store.as_ref(), seed).await?;
    }

    app::serve(app::build_app(app_state)).await
}
