//! Live reload development server for devsrv.
//!
//! This crate provides a native Rust HTTP server using axum, serving:
//! - Static files from a root directory
//! - A browser client script injected into every HTML page
//! - WebSocket endpoint pushing reload events when watched files change
//!
//! # Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use devsrv_server::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut server = Server::new();
//!     server.watch(".", Duration::from_secs(1), None);
//!     server.serve(".", 8000).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum server (devsrv-server)
//!                        │
//!                        ├─► Static files (root directory, client injected into HTML)
//!                        │
//!                        └─► WebSocket /__livereload ◄── broadcast ◄── LiveReloadManager
//!                                                                          │
//!                                     notify ──► debouncer ──► build action┘
//! ```

mod app;
mod error;
mod live_reload;
mod middleware;
mod state;
mod static_files;
mod watch;

use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use state::AppState;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

pub use error::ServerError;
pub use live_reload::ShellAction;
pub use watch::{DEFAULT_IGNORE, WatchRegistration};

/// Number of reload events buffered per connected browser.
const RELOAD_CHANNEL_CAPACITY: usize = 100;

/// Development preview server.
///
/// Collects watch registrations, then binds and serves a root directory.
#[derive(Clone, Debug)]
pub struct Server {
    host: String,
    live_reload: bool,
    watches: Vec<WatchRegistration>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            live_reload: true,
            watches: Vec::new(),
        }
    }
}

impl Server {
    /// Create a server bound to `127.0.0.1` with live reload enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host address (name or IP) to bind to.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Enable or disable live reload.
    ///
    /// When disabled, watch registrations are kept but no watcher starts.
    #[must_use]
    pub fn with_live_reload(mut self, enabled: bool) -> Self {
        self.live_reload = enabled;
        self
    }

    /// Watch `path` for changes, debounced by `delay`.
    ///
    /// If `action` is given it runs before browsers are notified; when it
    /// fails the reload for that change is skipped.
    pub fn watch(
        &mut self,
        path: impl Into<PathBuf>,
        delay: Duration,
        action: Option<ShellAction>,
    ) -> &mut Self {
        let mut registration = WatchRegistration::new(path, delay);
        registration.action = action;
        self.add_watch(registration)
    }

    /// Add a fully configured watch registration.
    pub fn add_watch(&mut self, registration: WatchRegistration) -> &mut Self {
        self.watches.push(registration);
        self
    }

    /// Registered watches.
    #[must_use]
    pub fn watches(&self) -> &[WatchRegistration] {
        &self.watches
    }

    /// Serve `root` on `port` until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or a watch path is missing, the port
    /// cannot be bound, or a watcher fails to start.
    pub async fn serve(self, root: impl AsRef<Path>, port: u16) -> Result<(), ServerError> {
        self.bind(root, port)
            .await?
            .run_until(shutdown_signal())
            .await
    }

    /// Validate the setup, bind the listener and start the watchers.
    ///
    /// Port 0 binds a free port; see [`BoundServer::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns an error if the root or a watch path is missing, the port
    /// cannot be bound, or a watcher fails to start.
    pub async fn bind(self, root: impl AsRef<Path>, port: u16) -> Result<BoundServer, ServerError> {
        let root = resolve_root(root.as_ref()).await?;
        let watches = self
            .watches
            .into_iter()
            .map(WatchRegistration::canonicalized)
            .collect::<Result<Vec<_>, _>>()?;

        let listener = TcpListener::bind((self.host.as_str(), port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{}:{port}", self.host),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        // Create live reload manager if enabled
        let live_reload = if self.live_reload {
            let (tx, _rx) = broadcast::channel::<live_reload::ReloadEvent>(RELOAD_CHANNEL_CAPACITY);
            let mut manager = live_reload::LiveReloadManager::new(root.clone(), tx);
            for registration in &watches {
                manager.start(registration)?;
            }
            Some(manager)
        } else {
            if !watches.is_empty() {
                tracing::info!(
                    count = watches.len(),
                    "Live reload disabled, watch registrations ignored"
                );
            }
            None
        };

        Ok(BoundServer {
            listener,
            state: Arc::new(AppState { root, live_reload }),
            local_addr,
        })
    }
}

/// A server whose listener is bound and whose watchers are running.
pub struct BoundServer {
    listener: TcpListener,
    state: Arc<AppState>,
    local_addr: SocketAddr,
}

impl BoundServer {
    /// The address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The canonical root directory being served.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.state.root
    }

    /// Serve requests until `shutdown` completes.
    ///
    /// The listener is released before this returns; watchers stop once the
    /// last request handler lets go of the shared state.
    ///
    /// # Errors
    ///
    /// Returns an error if the accept loop fails.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            address = %self.local_addr,
            root = %self.state.root.display(),
            live_reload = self.state.live_reload_enabled(),
            "Starting server"
        );

        let router = app::create_router(self.state);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Server stopped");

        Ok(())
    }
}

/// Resolve the root to its canonical form, requiring an existing directory.
async fn resolve_root(root: &Path) -> Result<PathBuf, ServerError> {
    let canonical = match tokio::fs::canonicalize(root).await {
        Ok(path) => path,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ServerError::RootNotFound(root.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    if !tokio::fs::metadata(&canonical).await?.is_dir() {
        return Err(ServerError::RootNotDirectory(root.to_path_buf()));
    }

    Ok(canonical)
}

/// Wait for shutdown signal (Ctrl-C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create a server from devsrv configuration.
///
/// Root and port are not part of the returned [`Server`]; pass
/// `config.root` and `config.server.port` to [`Server::serve`].
#[must_use]
pub fn server_from_config(config: &devsrv_config::Config) -> Server {
    let mut server = Server::new()
        .with_host(config.server.host.clone())
        .with_live_reload(config.live_reload.enabled);

    for watch in &config.watches {
        let mut registration = WatchRegistration::new(watch.path.clone(), watch.delay);
        if let Some(command) = &watch.command {
            let mut action = ShellAction::new(command.command.clone());
            if let Some(cwd) = &command.cwd {
                action = action.with_cwd(cwd.clone());
            }
            registration = registration.with_action(action);
        }
        if let Some(ignore) = &watch.ignore {
            registration = registration.with_ignore(ignore.clone());
        }
        server.add_watch(registration);
    }

    server
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    /// Run a bound server in the background, returning its address, a
    /// shutdown trigger and the task handle.
    fn spawn(
        bound: BoundServer,
    ) -> (
        SocketAddr,
        oneshot::Sender<()>,
        JoinHandle<Result<(), ServerError>>,
    ) {
        let addr = bound.local_addr();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(bound.run_until(async move {
            let _ = rx.await;
        }));
        (addr, tx, handle)
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello wasm").unwrap();

        let mut server = Server::new();
        server.watch(dir.path(), Duration::from_millis(100), None);
        let bound = server.bind(dir.path(), 0).await.unwrap();
        let (addr, shutdown, handle) = spawn(bound);

        let response = http_get(addr, "/hello.txt").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("hello wasm"), "{response}");

        let response = http_get(addr, "/nope.txt").await;
        assert!(response.starts_with("HTTP/1.1 404"), "{response}");

        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_port_in_use_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = Server::new().bind(dir.path(), port).await.err().unwrap();

        assert!(err.is_addr_in_use(), "unexpected error: {err}");
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_releases_port() {
        let dir = tempfile::tempdir().unwrap();

        let bound = Server::new().bind(dir.path(), 0).await.unwrap();
        let (addr, shutdown, handle) = spawn(bound);
        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();

        let rebound = Server::new().bind(dir.path(), addr.port()).await;
        assert!(rebound.is_ok(), "port was not released");
    }

    #[tokio::test]
    async fn test_missing_root_fails() {
        let err = Server::new()
            .bind("/nonexistent/devsrv/root", 0)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ServerError::RootNotFound(_)));
    }

    #[tokio::test]
    async fn test_file_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("index.html");
        std::fs::write(&file, "<p>hi</p>").unwrap();

        let err = Server::new().bind(&file, 0).await.err().unwrap();

        assert!(matches!(err, ServerError::RootNotDirectory(_)));
    }

    #[tokio::test]
    async fn test_missing_watch_path_fails_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut server = Server::new();
        server.watch(dir.path().join("src"), Duration::from_secs(1), None);
        let err = server.bind(dir.path(), port).await.err().unwrap();

        // The watch path is checked first, so the taken port is never tried
        assert!(matches!(err, ServerError::WatchPathNotFound(_)));
    }

    #[tokio::test]
    async fn test_reload_reaches_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("index.html"), "<body>v1</body>").unwrap();

        let delay = Duration::from_millis(150);
        let mut server = Server::new();
        server.watch(&root, delay, None);
        let bound = server.bind(&root, 0).await.unwrap();
        let mut receiver = bound.state.live_reload.as_ref().unwrap().subscribe();

        std::fs::write(root.join("index.html"), "<body>v2</body>").unwrap();

        let event = tokio::time::timeout(delay + Duration::from_secs(2), receiver.recv())
            .await
            .expect("no reload event received")
            .unwrap();
        assert_eq!(
            event,
            live_reload::ReloadEvent::Reload {
                paths: vec!["/index.html".to_owned()]
            }
        );
    }

    #[tokio::test]
    async fn test_reload_reaches_websocket_client() {
        use futures_util::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("index.html"), "<body>v1</body>").unwrap();

        let delay = Duration::from_millis(150);
        let mut server = Server::new();
        server.watch(&root, delay, None);
        let (addr, shutdown, handle) = spawn(server.bind(&root, 0).await.unwrap());

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/__livereload"))
            .await
            .unwrap();

        std::fs::write(root.join("index.html"), "<body>v2</body>").unwrap();

        let message = tokio::time::timeout(delay + Duration::from_secs(2), socket.next())
            .await
            .expect("no frame received")
            .unwrap()
            .unwrap();
        assert_eq!(
            message.to_text().unwrap(),
            r#"{"type":"reload","paths":["/index.html"]}"#
        );

        drop(socket);
        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_live_reload_disabled_starts_no_watchers() {
        let dir = tempfile::tempdir().unwrap();

        let mut server = Server::new().with_live_reload(false);
        server.watch(dir.path(), Duration::from_secs(1), None);
        let bound = server.bind(dir.path(), 0).await.unwrap();

        assert!(!bound.state.live_reload_enabled());
    }

    #[test]
    fn test_server_from_config() {
        let mut config = devsrv_config::Config::default();
        config.server.host = "0.0.0.0".to_owned();
        config.watches = vec![devsrv_config::WatchConfig {
            path: PathBuf::from("src"),
            delay: Duration::from_millis(250),
            command: Some(devsrv_config::CommandConfig {
                command: "make".to_owned(),
                cwd: Some(PathBuf::from("build")),
            }),
            ignore: Some(vec!["*.o".to_owned()]),
        }];

        let server = server_from_config(&config);

        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(
            server.watches(),
            &[WatchRegistration::new("src", Duration::from_millis(250))
                .with_action(ShellAction::new("make").with_cwd("build"))
                .with_ignore(vec!["*.o".to_owned()])]
        );
    }

    #[test]
    fn test_server_from_default_config_watches_with_default_ignores() {
        let config = devsrv_config::Config::default();
        let server = server_from_config(&config);

        assert_eq!(server.watches().len(), 1);
        assert_eq!(server.watches()[0].delay(), Duration::from_secs(1));
        assert_eq!(server.watches()[0].ignore, DEFAULT_IGNORE);
    }
}
