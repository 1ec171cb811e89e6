//! HTTP transport for the gateway.
//!
//! Routing is described by an [`App`] value built once at startup and handed to
//! [`serve`]; nothing is registered globally.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::{FederationGateway, GraphQLRequest, GraphQLResponse};

type Body = BoxBody<Bytes, hyper::Error>;

// Create a response body from a string
fn full<T: Into<Bytes>>(value: T) -> Body {
    Full::new(value.into())
        .map_err(|never| match never {})
        .boxed()
}

const GRAPHIQL_HTML: &str = r#"
<!DOCTYPE html>
<html>
<head>
  <title>GraphiQL - Storefront Gateway</title>
  <link href="https://unpkg.com/graphiql@1.5.0/graphiql.min.css" rel="stylesheet" />
  <style>
    body { margin: 0; padding: 0; height: 100vh; }
    #graphiql { height: 100vh; }
  </style>
</head>
<body>
  <div id="graphiql"></div>

  <script src="https://unpkg.com/react@17.0.2/umd/react.production.min.js"></script>
  <script src="https://unpkg.com/react-dom@17.0.2/umd/react-dom.production.min.js"></script>
  <script src="https://unpkg.com/graphiql@1.5.0/graphiql.min.js"></script>
  <script>
    function graphQLFetcher(graphQLParams) {
      return fetch('__GRAPHQL_PATH__', {
        method: 'post',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(graphQLParams),
      }).then(response => response.json());
    }

    ReactDOM.render(
      React.createElement(GraphiQL, { fetcher: graphQLFetcher }),
      document.getElementById('graphiql')
    );
  </script>
</body>
</html>
"#;

/// The routes the server answers and the gateway behind them.
#[derive(Clone)]
pub struct App {
    gateway: Arc<FederationGateway>,
    graphql_path: String,
    playground_path: Option<String>,
    health_path: String,
}

impl App {
    pub fn builder(gateway: Arc<FederationGateway>) -> AppBuilder {
        AppBuilder {
            app: App {
                gateway,
                graphql_path: "/graphql".to_string(),
                playground_path: Some("/playground".to_string()),
                health_path: "/health".to_string(),
            },
        }
    }

    async fn handle(
        &self,
        req: Request<Incoming>,
        cancel: CancellationToken,
    ) -> Result<Response<Body>, Infallible> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        tracing::debug!(%method, %path, "received request");

        let response = match (&method, path.as_str()) {
            (&Method::POST, p) if p == self.graphql_path => self.graphql(req, cancel).await,
            (&Method::GET, p) if p == self.health_path => text(StatusCode::OK, "OK"),
            (&Method::GET, p) if Some(p) == self.playground_path.as_deref() => {
                let html = GRAPHIQL_HTML.replace("__GRAPHQL_PATH__", &self.graphql_path);
                with_cors(Response::builder().header("Content-Type", "text/html"))
                    .body(full(html))
                    .unwrap_or_else(|_| internal_server_error())
            }
            (&Method::GET, "/") => match &self.playground_path {
                Some(playground) => with_cors(
                    Response::builder()
                        .status(StatusCode::FOUND)
                        .header("Location", playground.as_str()),
                )
                .body(full(""))
                .unwrap_or_else(|_| internal_server_error()),
                None => text(StatusCode::NOT_FOUND, "Not Found"),
            },
            (&Method::OPTIONS, _) => with_cors(Response::builder())
                .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
                .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
                .body(full(""))
                .unwrap_or_else(|_| internal_server_error()),
            _ => text(StatusCode::NOT_FOUND, "Not Found"),
        };
        Ok(response)
    }

    async fn graphql(&self, req: Request<Incoming>, cancel: CancellationToken) -> Response<Body> {
        let body_bytes = match req.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => return text(StatusCode::BAD_REQUEST, "Failed to read request body"),
        };

        let request = match serde_json::from_slice::<GraphQLRequest>(&body_bytes) {
            Ok(request) => request,
            Err(e) => {
                return text(StatusCode::BAD_REQUEST, format!("Invalid JSON request: {e}"));
            }
        };

        match self.gateway.process_request(request, cancel).await {
            Ok(response) => json_response(StatusCode::OK, &response),
            Err(e) => {
                let status = match e {
                    GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    GatewayError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
                    GatewayError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                };
                json_response(status, &GraphQLResponse::error(e.to_string()))
            }
        }
    }
}

pub struct AppBuilder {
    app: App,
}

impl AppBuilder {
    pub fn graphql_path(mut self, path: impl Into<String>) -> Self {
        self.app.graphql_path = path.into();
        self
    }

    pub fn playground_path(mut self, path: Option<String>) -> Self {
        self.app.playground_path = path;
        self
    }

    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.app.health_path = path.into();
        self
    }

    pub fn build(self) -> App {
        self.app
    }
}

fn with_cors(builder: http::response::Builder) -> http::response::Builder {
    builder.header("Access-Control-Allow-Origin", "*")
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Body> {
    with_cors(Response::builder().status(status))
        .body(full(body))
        .unwrap_or_else(|_| internal_server_error())
}

fn json_response(status: StatusCode, response: &GraphQLResponse) -> Response<Body> {
    let body = serde_json::to_string(response).unwrap_or_else(|e| {
        json!({ "errors": [{ "message": format!("failed to serialize response: {e}") }] })
            .to_string()
    });
    with_cors(
        Response::builder()
            .status(status)
            .header("Content-Type", "application/json"),
    )
    .body(full(body))
    .unwrap_or_else(|_| internal_server_error())
}

// Create a standard internal server error response
fn internal_server_error() -> Response<Body> {
    let mut response = Response::new(full("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[derive(Clone)]
// An Executor that uses the tokio runtime.
pub struct TokioExecutor;

impl<F> hyper::rt::Executor<F> for TokioExecutor
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        tokio::task::spawn(fut);
    }
}

/// Accept connections until `shutdown` fires. Every request runs under a child
/// token of `shutdown`, so stopping the server cancels queries still in flight.
pub async fn serve(listener: TcpListener, app: App, shutdown: CancellationToken) -> io::Result<()> {
    let app = Arc::new(app);
    tracing::info!(addr = ?listener.local_addr().ok(), "gateway listening");

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("shutting down listener");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };
        let io = TokioIo::new(stream);
        let app = Arc::clone(&app);
        let shutdown = shutdown.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let app = Arc::clone(&app);
                let cancel = shutdown.child_token();
                async move {
                    // Dropping the guard (e.g. the client went away) cancels the query.
                    let guard = cancel.clone().drop_guard();
                    let response = app.handle(req, cancel).await;
                    let _ = guard.disarm();
                    response
                }
            });

            if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor)
                .serve_connection(io, service)
                .await
            {
                tracing::debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}
