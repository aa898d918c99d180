//! Mock server lifecycle and request dispatch

use std::net::{Ipv4Addr, SocketAddr};
use std::ops::Range;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::method::Method;
use crate::route::{Inspector, ReceivedRequest, Route, RouteTable};

/// Default port range for [`MockServer::start`].
pub const PORT_MIN: u16 = 3000;
pub const PORT_MAX: u16 = 4000;

/// Request dispatch state shared with the serve task
#[derive(Clone)]
struct AppState {
    table: Arc<RwLock<RouteTable>>,
}

/// A mock HTTP server answering registered routes with canned JSON payloads.
///
/// The port is owned exclusively between [`MockServer::start`] and
/// [`MockServer::shutdown`]. Dropping the server also signals shutdown, so a
/// panicking test does not leak its port for the rest of the run.
#[derive(Debug)]
pub struct MockServer {
    addr: SocketAddr,
    prefix: String,
    table: Arc<RwLock<RouteTable>>,
    shutdown: Option<oneshot::Sender<()>>,
    served: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Start a server on a pseudo-random localhost port in `3000..4000`.
    ///
    /// `prefix` is prepended to every registered path: `"api/v1"` puts routes
    /// under `/api/v1/...`. A bind failure surfaces as [`Error::Bind`]; no
    /// other port is tried.
    pub async fn start(prefix: &str) -> Result<Self> {
        Self::start_in_range(prefix, PORT_MIN..PORT_MAX).await
    }

    /// Start a server on a pseudo-random port within an explicit range.
    ///
    /// An empty range (`p..p`) is treated as a request for the fixed port `p`.
    pub async fn start_in_range(prefix: &str, ports: Range<u16>) -> Result<Self> {
        let port = if ports.is_empty() {
            ports.start
        } else {
            fastrand::u16(ports)
        };

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|source| Error::Bind { port, source })?;
        let addr = listener.local_addr()?;

        let table = Arc::new(RwLock::new(RouteTable::default()));
        let router = build_router(table.clone());

        let (tx, rx) = oneshot::channel::<()>();
        let served = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(%error, "mock endpoint server terminated abnormally");
            }
        });

        let prefix = normalize_prefix(prefix);
        tracing::info!(%addr, %prefix, "started mock endpoint server");

        Ok(Self {
            addr,
            prefix,
            table,
            shutdown: Some(tx),
            served: Some(served),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Absolute URL for a path under the server's prefix.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}{}", self.addr, self.prefix, normalize_path(path))
    }

    /// Register a route answering `payload` at `prefix + path`.
    ///
    /// At most one route exists per (method, path) pair; registering the pair
    /// again replaces the prior route.
    pub async fn route(&self, method: Method, path: &str, payload: impl Serialize) -> Result<()> {
        self.register(method, path, payload, None).await
    }

    /// Register a route that also hands each matching request to `inspect`
    /// before the response is written.
    ///
    /// A panic in the inspector fails the request task and propagates to the
    /// test framework.
    pub async fn route_with_inspector(
        &self,
        method: Method,
        path: &str,
        payload: impl Serialize,
        inspect: impl Fn(&ReceivedRequest) + Send + Sync + 'static,
    ) -> Result<()> {
        self.register(method, path, payload, Some(Arc::new(inspect)))
            .await
    }

    /// Register a route with the method given by name (`"GET"`, `"post"`, ...).
    ///
    /// Unknown names fail with [`Error::InvalidMethod`] and bind nothing; the
    /// server keeps running.
    pub async fn route_named(
        &self,
        method: &str,
        path: &str,
        payload: impl Serialize,
    ) -> Result<()> {
        let method = method.parse::<Method>()?;
        self.register(method, path, payload, None).await
    }

    async fn register(
        &self,
        method: Method,
        path: &str,
        payload: impl Serialize,
        inspector: Option<Inspector>,
    ) -> Result<()> {
        let payload = serde_json::to_value(payload)?;
        let full_path = format!("{}{}", self.prefix, normalize_path(path));
        tracing::debug!(%method, path = %full_path, "registered mock route");

        let mut table = self.table.write().await;
        table.insert(method, full_path, Route { payload, inspector });
        Ok(())
    }

    /// Stop accepting connections and release the port.
    ///
    /// Awaits the serve task, so the port is free again when this returns.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(served) = self.served.take() {
            if let Err(error) = served.await {
                tracing::error!(%error, "mock endpoint server task failed");
            }
        }
        tracing::info!(addr = %self.addr, "mock endpoint server shut down");
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        // Shutdown not called; signal the serve task so the port is released.
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
            tracing::debug!(addr = %self.addr, "mock endpoint server shut down on drop");
        }
    }
}

fn build_router(table: Arc<RwLock<RouteTable>>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(AppState { table })
        .layer(TraceLayer::new_for_http())
}

/// Resolve every incoming request against the route table.
async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(%error, "failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let path = parts.uri.path().to_string();
    let route = {
        let table = state.table.read().await;
        table.resolve(&parts.method, &path).cloned()
    };

    let Some(route) = route else {
        tracing::debug!(method = %parts.method, %path, "no mock route matched");
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(inspect) = &route.inspector {
        let received = ReceivedRequest {
            method: parts.method,
            path,
            query: parts.uri.query().map(str::to_owned),
            headers: parts.headers,
            body,
        };
        inspect(&received);
    }

    Json(route.payload).into_response()
}

/// Normalize a prefix to `"/segment"` form; empty or `"/"` collapses to `""`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
