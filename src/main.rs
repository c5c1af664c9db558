mod clients;
mod config;
mod database;
mod error;
mod filters;
mod handlers;
mod models;
mod services;
mod store;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use crate::clients::{ActivityLog, LogNotifier, MailerClient, Notifier};
use crate::config::AppConfig;
use crate::database::Database;
use crate::services::{ServiceContext, Services};
use crate::store::DirectoryStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|err| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
    })?;

    let db = Database::connect(&config.database_url).await.map_err(|err| {
        log::error!("Failed to initialize database: {err:?}");
        std::io::Error::new(std::io::ErrorKind::Other, err)
    })?;
    log::info!("Database ready, migrations applied");

    let notifier: Arc<dyn Notifier> = match &config.mailer_url {
        Some(url) => {
            log::info!("Sending notifications through {url}");
            let mailer = MailerClient::new(url).map_err(|err| {
                log::error!("Failed to build mail relay client: {err}");
                std::io::Error::new(std::io::ErrorKind::Other, err)
            })?;
            Arc::new(mailer)
        }
        None => {
            log::warn!("MAILER_URL not set; notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let db = Arc::new(db);
    let store: Arc<dyn DirectoryStore> = db.clone();
    let activity: Arc<dyn ActivityLog> = db;
    let services = web::Data::new(Services::new(ServiceContext::new(
        store,
        activity,
        notifier,
        config.notifications.clone(),
    )));

    let bind_address = config.bind_address();
    log::info!("Starting local business directory service on {bind_address}");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(services.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .service(web::scope("/api/v1").configure(handlers::configure))
    })
    .bind(&bind_address)?
    .run()
    .await
}
