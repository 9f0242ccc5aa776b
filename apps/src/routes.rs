//! HTTP surfaces of the drain listener and the log emitter

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;

use crate::sink::LineSink;

type SharedSink = Arc<dyn LineSink>;

/// Prints the body of every request, whatever its method or path.
pub fn listener_router(sink: SharedSink) -> Router {
    Router::new().fallback(print_body).with_state(sink)
}

/// `GET /log/<message>` prints `<message>`.
pub fn emitter_router(sink: SharedSink) -> Router {
    Router::new().route("/log/:message", get(print_message)).with_state(sink)
}

async fn print_body(State(sink): State<SharedSink>, body: Bytes) -> StatusCode {
    sink.emit(&String::from_utf8_lossy(&body));
    StatusCode::OK
}

async fn print_message(State(sink): State<SharedSink>, Path(message): Path<String>) -> StatusCode {
    sink.emit(&message);
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::net::SocketAddr;

    async fn serve_local(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_listener_prints_request_bodies() {
        let sink = MemorySink::new();
        let addr = serve_local(listener_router(Arc::new(sink.clone()))).await;
        let client = reqwest::Client::new();

        let line = "<14>1 2024-01-01T00:00:00Z host app [APP/PROC/WEB/0] - - RANDOM-MESSAGE-A";
        let status = client
            .post(format!("http://{addr}/"))
            .body(line)
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status, reqwest::StatusCode::OK);

        client.post(format!("http://{addr}/any/path")).body("second").send().await.unwrap();
        assert_eq!(sink.lines(), vec![line.to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_emitter_prints_path_message() {
        let sink = MemorySink::new();
        let addr = serve_local(emitter_router(Arc::new(sink.clone()))).await;

        let response = reqwest::get(format!("http://{addr}/log/RANDOM-MESSAGE-B-1-LOG-00ff"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(sink.lines(), vec!["RANDOM-MESSAGE-B-1-LOG-00ff"]);

        let missing = reqwest::get(format!("http://{addr}/other")).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
