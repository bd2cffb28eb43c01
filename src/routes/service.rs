use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use serde_json::json;

use crate::KOTLIN_LANGUAGE_ID;
use crate::broker::{Broker, ProviderHealth};
use crate::judge0::LanguageDescriptor;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cache_size: usize,
    available_providers: usize,
    providers: Vec<ProviderHealth>,
}

#[get("/")]
pub async fn index_handler(broker: web::Data<Broker>) -> impl Responder {
    let providers: Vec<&str> = broker.providers().iter().map(|p| p.name()).collect();

    HttpResponse::Ok().json(json!({
        "message": "Kotlin Compiler API",
        "status": "running",
        "supported_language": format!("Kotlin (language_id: {KOTLIN_LANGUAGE_ID})"),
        "version": env!("CARGO_PKG_VERSION"),
        "providers": providers,
        "features": ["Ordered provider fallback", "In-memory caching", "Sandboxed local execution"],
    }))
}

#[get("/health")]
pub async fn health_handler(broker: web::Data<Broker>) -> impl Responder {
    let providers = broker.provider_health().await;

    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        cache_size: broker.cache().len(),
        available_providers: providers.iter().filter(|p| p.available).count(),
        providers,
    })
}

#[get("/languages")]
pub async fn languages_handler(language: web::Data<LanguageDescriptor>) -> impl Responder {
    HttpResponse::Ok().json([language.get_ref()])
}
