use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use std::sync::Arc;
use tracing::info;
use user_service::application::account_service::AccountService;
use user_service::data::user_repository::InMemoryUserRepository;
use user_service::infrastructure::config::ServiceConfig;
use user_service::infrastructure::logging::init_logging;
use user_service::infrastructure::point_client::HttpPointGateway;
use user_service::infrastructure::token::TokenCodec;
use user_service::presentation::handlers::{AppState, configure};
use user_service::presentation::middleware::RequestTracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = ServiceConfig::from_env()?;
    info!(
        point_url = %config.point_url,
        post_url = %config.post_url,
        point_timeout_secs = config.point_timeout.as_secs(),
        "Upstream services configured"
    );

    let repository = Arc::new(InMemoryUserRepository::new());
    let point_gateway = Arc::new(HttpPointGateway::new(
        config.point_url.clone(),
        config.point_timeout,
    )?);
    let tokens = TokenCodec::new(&config.token_secret, config.token_ttl);

    let state = web::Data::new(AppState {
        accounts: AccountService::new(
            repository,
            point_gateway,
            tokens,
            config.signup_bonus_points,
        ),
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .wrap(RequestTracing)
            .configure(configure)
    })
    .bind(&config.bind_addr)?;

    info!(address = %config.bind_addr, "Starting HTTP server");
    server.run().await?;
    Ok(())
}
