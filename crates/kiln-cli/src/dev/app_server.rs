//! Application server.
//!
//! Serves built client assets under the configured public path and every
//! other request from the server output directory, read through the
//! [`ModuleRegistry`]. In development mode HTML responses get the live
//! reload client injected before `</body>`.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use kiln_config::{BuildConfiguration, BuildMode};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::dev::{ModuleRegistry, DEFAULT_NOTIFY_PORT};
use crate::error::{CliError, Result};

/// Path of the live reload client script.
pub const LIVE_RELOAD_PATH: &str = "/__kiln/live-reload.js";

const RELOAD_SCRIPT: &str = include_str!("../../assets/dev/live-reload.js");

#[derive(Clone)]
struct AppState {
    registry: Arc<ModuleRegistry>,
    server_dir: PathBuf,
    mode: BuildMode,
    notify_port: u16,
}

/// Running application server.
pub struct AppServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl AppServer {
    /// Build the router without binding anything.
    pub fn router(config: &BuildConfiguration, mode: BuildMode, registry: Arc<ModuleRegistry>) -> Router {
        Self::router_with_notify_port(config, mode, registry, DEFAULT_NOTIFY_PORT)
    }

    pub fn router_with_notify_port(
        config: &BuildConfiguration,
        mode: BuildMode,
        registry: Arc<ModuleRegistry>,
        notify_port: u16,
    ) -> Router {
        let state = AppState {
            registry,
            server_dir: config.server_output_directory.clone(),
            mode,
            notify_port,
        };

        let assets = ServeDir::new(&config.assets_output_directory);
        let public_path = config.public_path.trim_end_matches('/');

        let mut router = Router::new().route(LIVE_RELOAD_PATH, get(live_reload_script));
        router = if public_path.is_empty() {
            // Assets share the root with server output; assets win
            router.fallback_service(assets.fallback(get(serve_module).with_state::<()>(state.clone())))
        } else {
            router
                .nest_service(public_path, assets)
                .fallback(serve_module)
        };

        router.with_state(state).layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
    }

    /// Bind `0.0.0.0:port` and start serving.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Bind` if the port is unavailable.
    pub async fn bind(
        config: &BuildConfiguration,
        mode: BuildMode,
        registry: Arc<ModuleRegistry>,
        port: u16,
        notify_port: u16,
    ) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| CliError::Bind { port, source })?;
        let local_addr = listener.local_addr()?;
        let app = Self::router_with_notify_port(config, mode, registry, notify_port);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                tracing::error!("App server error: {}", e);
            }
        });

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting requests and wait for in-flight ones.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::debug!("App server task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for AppServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn live_reload_script(State(state): State<AppState>) -> impl IntoResponse {
    let script = RELOAD_SCRIPT.replace("__KILN_NOTIFY_PORT__", &state.notify_port.to_string());
    ([(header::CONTENT_TYPE, "application/javascript")], script)
}

/// Serve a file from the server output directory.
///
/// `/` maps to `index.html`; `/a/b` tries `a/b`, `a/b.html` and
/// `a/b/index.html` in that order.
async fn serve_module(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path();

    for candidate in candidates(path) {
        let full = state.server_dir.join(&candidate);
        if state.registry.get(&full).is_none() && !is_file(&full).await {
            continue;
        }
        match state.registry.load(&full).await {
            Ok(module) => {
                let content_type = module.content_type;
                let body = if state.mode.is_development() {
                    inject_reload_script(&module.contents, content_type)
                } else {
                    module.contents.clone()
                };
                return ([(header::CONTENT_TYPE, content_type)], body).into_response();
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", full.display(), e);
            }
        }
    }

    (StatusCode::NOT_FOUND, format!("Not found: {}", path)).into_response()
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

/// Relative file paths a request path may resolve to. Empty for paths that
/// try to leave the server directory.
fn candidates(request_path: &str) -> Vec<PathBuf> {
    let rel = request_path.trim_matches('/');
    if rel.is_empty() {
        return vec![PathBuf::from("index.html")];
    }

    let rel_path = Path::new(rel);
    if rel_path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Vec::new();
    }

    vec![
        rel_path.to_path_buf(),
        PathBuf::from(format!("{}.html", rel)),
        rel_path.join("index.html"),
    ]
}

/// Add the live reload client before the closing `</body>` tag.
fn inject_reload_script(content: &[u8], content_type: &str) -> Vec<u8> {
    if !content_type.starts_with("text/html") {
        return content.to_vec();
    }

    let html = String::from_utf8_lossy(content);
    let script_tag = format!(r#"<script src="{}"></script>"#, LIVE_RELOAD_PATH);

    if let Some(pos) = html.rfind("</body>") {
        let mut result = String::with_capacity(html.len() + script_tag.len() + 4);
        result.push_str(&html[..pos]);
        result.push_str(&script_tag);
        result.push('\n');
        result.push_str(&html[pos..]);
        return result.into_bytes();
    }

    let mut result = html.into_owned();
    result.push('\n');
    result.push_str(&script_tag);
    result.into_bytes()
}
