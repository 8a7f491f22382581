use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;
use uuid::Uuid;

/// Per-request start time and correlation id.
struct RequestTrace {
    started: Instant,
    id: Uuid,
}

fn trace<'r>(request: &'r Request<'_>) -> &'r RequestTrace {
    request.local_cache(|| RequestTrace {
        started: Instant::now(),
        id: Uuid::new_v4(),
    })
}

/// Fairing to log one line per HTTP request with timing.
///
/// Health probes are logged at debug level, server errors at warn.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        trace(request);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let trace = trace(request);
        let status = response.status();
        let level = if status.code >= 500 {
            log::Level::Warn
        } else if request.uri().path().ends_with("/health") {
            log::Level::Debug
        } else {
            log::Level::Info
        };

        log::log!(
            level,
            "[{}] {} {} -> {} ({:.2}ms)",
            trace.id.simple(),
            request.method(),
            request.uri(),
            status.code,
            trace.started.elapsed().as_secs_f64() * 1000.0
        );
    }
}
