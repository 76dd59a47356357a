use actix_cors::Cors;
use actix_web::{middleware::ErrorHandlers, middleware::Logger, web, App, HttpServer};
use log::{error, info};
use std::sync::Arc;

use todo_api::app::{not_found, AppState};
use todo_api::auth::PasswordHasher;
use todo_api::clock::{OsEntropy, SystemClock};
use todo_api::config::{AppEnvironment, Config};
use todo_api::error::reveal_error_detail;
use todo_api::store::PgStore;

fn cors_for(environment: AppEnvironment) -> Cors {
    if environment.is_development() {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600)
    } else {
        Cors::default()
    }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let store = PgStore::connect(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to database", e))?;
    store
        .migrate()
        .await
        .map_err(|e| startup_error("Failed to run migrations", e))?;

    let environment = config.environment;
    let state = AppState::new(
        Arc::new(store),
        Arc::new(SystemClock),
        Arc::new(OsEntropy),
        config.jwt.clone(),
        PasswordHasher::new(config.bcrypt_cost),
        environment,
    );

    info!(
        "Starting todo-api ({}) at {}",
        environment.as_str(),
        config.server_url()
    );
    HttpServer::new(move || {
        App::new()
            .wrap(ErrorHandlers::new().default_handler_server(reveal_error_detail))
            .wrap(cors_for(environment))
            .wrap(Logger::default())
            .configure(|cfg| state.configure(cfg))
            .default_service(web::to(not_found))
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
