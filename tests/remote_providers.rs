use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use ktjudge::broker::{Broker, CompileRequest, Status};
use ktjudge::cache::InMemoryResultCache;
use ktjudge::config::{LocalConfig, ProviderConfig, RemoteConfig, Second};
use ktjudge::providers::build_providers;

async fn codex_handler(req: HttpRequest, body: web::Json<Value>) -> HttpResponse {
    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|v| v.to_str().ok());
    if user_agent != Some("KotlinCompilerAPI/1.0") || body["language"] != "kt" {
        return HttpResponse::Ok().json(json!({ "error": "unexpected request" }));
    }

    HttpResponse::Ok().json(json!({
        "output": format!("input was {}", body["input"].as_str().unwrap_or_default()),
        "error": ""
    }))
}

async fn onecompiler_handler(body: web::Json<Value>) -> HttpResponse {
    assert_eq!(body["files"][0]["name"], "main.kt");
    HttpResponse::Ok().json(json!({
        "stdout": "",
        "stderr": "Main.kt:1:12: error: expecting ')'",
        "exception": "CompilationError"
    }))
}

async fn slow_handler() -> HttpResponse {
    tokio::time::sleep(Duration::from_secs(5)).await;
    HttpResponse::Ok().json(json!({ "success": true, "output": "too late" }))
}

async fn garbage_handler() -> HttpResponse {
    HttpResponse::BadGateway()
        .content_type("text/html")
        .body("<html>502 Bad Gateway</html>")
}

async fn start_mock_server() -> (SocketAddr, ServerHandle) {
    let server = HttpServer::new(|| {
        App::new()
            .route("/codex", web::post().to(codex_handler))
            .route("/onecompiler", web::post().to(onecompiler_handler))
            .route("/slow", web::post().to(slow_handler))
            .route("/garbage", web::post().to(garbage_handler))
    })
    .workers(2)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);
    (addr, handle)
}

// A port nobody listens on
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn broker_for(providers: Vec<ProviderConfig>) -> Broker {
    let remote = RemoteConfig {
        time_limit: Second(1),
        ..RemoteConfig::default()
    };
    let providers = build_providers(&providers, &remote, &LocalConfig::default()).unwrap();
    Broker::new(providers, Arc::new(InMemoryResultCache::default()))
}

fn request(stdin: &str) -> CompileRequest {
    CompileRequest::new("fun main() { println(readLine()) }", stdin).unwrap()
}

#[actix_web::test]
async fn test_falls_back_past_unreachable_provider() {
    let (addr, handle) = start_mock_server().await;
    let broker = broker_for(vec![
        ProviderConfig::Codex {
            endpoint: format!("http://127.0.0.1:{}/codex", closed_port()),
        },
        ProviderConfig::Codex {
            endpoint: format!("http://{addr}/codex"),
        },
    ]);

    let result = broker.compile(&request("42")).await;

    assert_eq!(result.status, Status::Accepted);
    assert_eq!(result.output, "input was 42");
    handle.stop(false).await;
}

#[actix_web::test]
async fn test_slow_provider_is_skipped() {
    let (addr, handle) = start_mock_server().await;
    let broker = broker_for(vec![
        ProviderConfig::Programiz {
            endpoint: format!("http://{addr}/slow"),
        },
        ProviderConfig::Codex {
            endpoint: format!("http://{addr}/codex"),
        },
    ]);

    let started = Instant::now();
    let result = broker.compile(&request("")).await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(result.status, Status::Accepted);
    assert_eq!(result.output, "input was ");
    handle.stop(false).await;
}

#[actix_web::test]
async fn test_non_json_reply_is_an_api_error() {
    let (addr, handle) = start_mock_server().await;
    let broker = broker_for(vec![
        ProviderConfig::Codex {
            endpoint: format!("http://{addr}/garbage"),
        },
        ProviderConfig::Codex {
            endpoint: format!("http://{addr}/codex"),
        },
    ]);

    let result = broker.compile(&request("")).await;

    // The first provider answered, so there is no fallback
    assert_eq!(result.status, Status::ApiError);
    assert!(!result.success);
    assert_eq!(result.error, "CodeX: Invalid JSON response");
    handle.stop(false).await;
}

#[actix_web::test]
async fn test_onecompiler_compile_error() {
    let (addr, handle) = start_mock_server().await;
    let broker = broker_for(vec![ProviderConfig::OneCompiler {
        endpoint: format!("http://{addr}/onecompiler"),
    }]);

    let result = broker.compile(&request("")).await;

    assert_eq!(result.status, Status::CompilationError);
    assert_eq!(result.error, "Main.kt:1:12: error: expecting ')'");
    assert_eq!(result.output, "");
    handle.stop(false).await;
}

#[actix_web::test]
async fn test_every_provider_unreachable() {
    let broker = broker_for(vec![
        ProviderConfig::Codex {
            endpoint: format!("http://127.0.0.1:{}/codex", closed_port()),
        },
        ProviderConfig::Programiz {
            endpoint: format!("http://127.0.0.1:{}/compile", closed_port()),
        },
    ]);

    let result = broker.compile(&request("")).await;

    assert_eq!(result.status, Status::ServiceError);
    assert_eq!(
        result.error,
        "All compiler services are temporarily unavailable"
    );
    assert_eq!(broker.cache().len(), 0);

    let body = serde_json::to_value(&result).unwrap();
    assert_eq!(body["success"], json!(false));
}
