//! The HTTP surface (spec.md §6): a synchronous, thread-per-connection
//! router over `tiny_http`. No async runtime — admission is cheap and
//! build work happens on background worker threads, so handlers never
//! need to yield mid-request.

pub mod routes;

use std::io::Read;
use std::sync::Arc;

use tiny_http::{Header, Method, Response, Server};

use crate::build::BuildSemaphore;
use crate::config::Config;
use crate::job::JobsTable;
use routes::JsonResponse;

const BUILD_STATUS_PREFIX: &str = "/build/";

fn content_type_json() -> Header {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).expect("static header is valid")
}

fn send(request: tiny_http::Request, response: JsonResponse) {
    let reply = Response::from_string(response.body)
        .with_status_code(response.status)
        .with_header(content_type_json());
    if let Err(e) = request.respond(reply) {
        eprintln!("[http] failed to write response: {e}");
    }
}

fn header_value<'a>(request: &'a tiny_http::Request, name: &str) -> Option<&'a str> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn read_body(request: &mut tiny_http::Request) -> Vec<u8> {
    let mut body = Vec::new();
    let _ = request.as_reader().read_to_end(&mut body);
    body
}

/// Bind to `config.http_port` and serve requests until the process
/// exits. Each connection is handled to completion before the next
/// `recv()`, matching `tiny_http`'s default single-threaded loop; spawn
/// this on its own thread (or several, sharing the `Server`) for
/// concurrent handling.
pub fn serve(config: Arc<Config>, jobs: Arc<JobsTable>, semaphore: Arc<BuildSemaphore>) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", config.http_port);
    let server = Server::http(&addr).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    eprintln!("[http] listening on {addr}");

    for mut request in server.incoming_requests() {
        let method = request.method().clone();
        let url = request.url().to_string();

        let response = match (&method, url.as_str()) {
            (Method::Get, "/") => routes::health(),
            (Method::Get, path) if path.starts_with(BUILD_STATUS_PREFIX) => {
                let job_id = &path[BUILD_STATUS_PREFIX.len()..];
                routes::build_status(&jobs, job_id)
            }
            (Method::Get, "/builds") => routes::list_builds(&jobs),
            (Method::Post, "/webhook") => {
                let signature = header_value(&request, "X-Hub-Signature-256").map(|s| s.to_string());
                let event_type = header_value(&request, "X-GitHub-Event").unwrap_or("").to_string();
                let body = read_body(&mut request);
                routes::webhook(&config, Arc::clone(&jobs), Arc::clone(&semaphore), &body, signature.as_deref(), &event_type)
            }
            (Method::Post, "/build") => {
                let body = read_body(&mut request);
                routes::manual_build(&config, Arc::clone(&jobs), Arc::clone(&semaphore), &body)
            }
            (Method::Post, "/cleanup") => routes::cleanup(&config, &jobs),
            _ => JsonResponse {
                status: 404,
                body: "{\"error\":\"not found\"}".to_string(),
            },
        };

        send(request, response);
    }

    Ok(())
}
