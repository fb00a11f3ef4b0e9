use actix_cors::Cors;
use actix_files::Files;
use actix_web::{
    http::header,
    middleware::{Compress, Logger, NormalizePath},
    web, App, HttpServer,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recipe_api::config::Config;
use recipe_api::services::FsImageStore;
use recipe_api::{routes, store, AppState};

fn cors(allow_origin: &str) -> Cors {
    let cors = if allow_origin == "*" {
        // Reflect any origin so credentialed requests still work
        Cors::default().allowed_origin_fn(|_origin, _req_head| true)
    } else {
        allow_origin
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    cors.allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
        ])
        .expose_headers(vec![header::SET_COOKIE])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting Recipe API");

    let config = Config::from_env()?;
    info!("Configuration loaded from environment");

    let store = store::connect(&config).await?;
    info!("Store ready");

    std::fs::create_dir_all(&config.media_root)?;
    let state = web::Data::new(AppState {
        store,
        images: Arc::new(FsImageStore::from_config(&config)),
        config: Arc::new(config.clone()),
    });

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    let cors_allow_origin = config.cors_allow_origin.clone();
    let media_url = config.media_url.trim_end_matches('/').to_string();
    let media_root = config.media_root.clone();

    info!("Server running at http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors(&cors_allow_origin))
            .wrap(Compress::default())
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .configure(routes::configure)
            .service(Files::new(&media_url, &media_root))
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
