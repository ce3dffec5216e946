//! Live reload: file watching, build actions and the browser channel.

mod action;
mod client;
mod debouncer;
mod manager;
mod websocket;

pub use action::ShellAction;
pub(crate) use client::{SCRIPT_PATH, SOCKET_PATH, client_script, inject_client};
pub(crate) use manager::{LiveReloadManager, ReloadEvent};
pub(crate) use websocket::ws_handler;
