use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::broker::Broker;
use crate::config::ServerConfig;
use crate::judge0::LanguageDescriptor;
use crate::routes;

/// Permissive CORS headers attached to every response
pub fn cors_headers() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .add(("Access-Control-Allow-Headers", "Content-Type"))
}

pub fn build_server(
    server_config: ServerConfig,
    broker: web::Data<Broker>,
    language: web::Data<LanguageDescriptor>,
) -> std::io::Result<Server> {
    let bind_address = server_config
        .bind_address
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let bind_port = server_config.bind_port.unwrap_or(8080);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(broker.clone())
            .app_data(language.clone())
            .wrap(cors_headers())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((bind_address.as_str(), bind_port))?
    .run();

    log::info!("Listening on {bind_address}:{bind_port}");

    Ok(server)
}
