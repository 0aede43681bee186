use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vantahire_backend::{
    config::Config,
    database::pool::{create_pool, run_migrations},
    http_client, routes,
    services::mail_transport,
    AppState,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vantahire_backend=debug,tower_http=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let config = Arc::new(config);

    let pool = create_pool(&config).await?;
    run_migrations(&pool).await?;

    let transport = mail_transport::from_config(&config, http_client()?)?;
    let app_state = AppState::new(pool, config.clone(), transport)?;

    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        if let Err(e) = app_state.user_service.ensure_admin(username, password).await {
            tracing::error!(error = ?e, "Failed to bootstrap admin account");
        }
    }

    tokio::spawn(app_state.notification_service.clone().run_worker());

    // Keep the scheduler handle alive while serving.
    let _scheduler = app_state.maintenance_service.start_scheduler().await?;

    let app = routes::router(app_state);

    let listener = TcpListener::bind(&config.server_address).await?;
    info!(
        address = %config.server_address,
        job_source = ?config.job_source,
        mail_transport = ?config.mail_transport,
        "VantaHire backend listening"
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
