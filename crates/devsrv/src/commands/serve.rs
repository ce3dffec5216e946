//! Serve command implementation.

use std::path::PathBuf;

use clap::Args;
use devsrv_config::{CliSettings, Config};
use devsrv_server::server_from_config;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for serving a directory.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Directory to serve (overrides config, default: current directory).
    root: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover devsrv.toml).
    #[arg(short, long, env = "DEVSRV_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to watch; repeat to watch several (replaces configured watches).
    #[arg(short, long = "watch", value_name = "PATH")]
    watch: Vec<PathBuf>,

    /// Debounce delay in milliseconds for every watch (overrides config).
    #[arg(long, value_name = "N")]
    delay_ms: Option<u64>,

    /// Shell command to run before each reload (overrides config).
    #[arg(short = 'x', long = "exec", value_name = "COMMAND")]
    command: Option<String>,

    /// Enable verbose output (request and reload logs).
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable live reload (default: enabled).
    #[arg(long)]
    live_reload: Option<bool>,

    /// Disable live reload.
    #[arg(long, conflicts_with = "live_reload")]
    no_live_reload: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = Config::load(self.config.as_deref(), Some(&self.cli_settings()))?;
        tracing::debug!(
            config_path = ?config.config_path,
            watches = config.watches.len(),
            "Configuration loaded"
        );
        print_summary(&output, &config);

        server_from_config(&config)
            .serve(&config.root, config.server.port)
            .await?;

        output.info("Server stopped");
        Ok(())
    }

    /// Build configuration overrides from the parsed flags.
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.host.clone(),
            port: self.port,
            root: self.root.clone(),
            live_reload_enabled: self.resolve_live_reload_enabled(),
            watch_paths: (!self.watch.is_empty()).then(|| self.watch.clone()),
            delay_ms: self.delay_ms,
            command: self.command.clone(),
        }
    }

    /// Resolve `live_reload_enabled` from --live-reload/--no-live-reload flags.
    fn resolve_live_reload_enabled(&self) -> Option<bool> {
        self.no_live_reload.then_some(false).or(self.live_reload)
    }
}

fn print_summary(output: &Output, config: &Config) {
    output.highlight(&format!(
        "Serving {} at http://{}:{}/",
        config.root.display(),
        config.server.host,
        config.server.port
    ));

    if let Some(path) = &config.config_path {
        output.field("Config", &path.display().to_string());
    }

    if !config.live_reload.enabled {
        output.field("Live reload", "disabled");
        return;
    }
    output.field("Live reload", "enabled");

    for watch in &config.watches {
        let mut line = format!(
            "{} (delay {} ms)",
            watch.path.display(),
            watch.delay.as_millis()
        );
        if let Some(command) = &watch.command {
            line.push_str(&format!(", runs `{}`", command.command));
        }
        output.field("Watching", &line);
    }

    output.info("Press Ctrl-C to stop");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ServeArgs,
    }

    fn parse(args: &[&str]) -> ServeArgs {
        TestCli::try_parse_from(std::iter::once("devsrv").chain(args.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn test_no_flags_override_nothing() {
        let settings = parse(&[]).cli_settings();

        assert_eq!(settings.host, None);
        assert_eq!(settings.port, None);
        assert_eq!(settings.root, None);
        assert_eq!(settings.live_reload_enabled, None);
        assert_eq!(settings.watch_paths, None);
        assert_eq!(settings.delay_ms, None);
        assert_eq!(settings.command, None);
    }

    #[test]
    fn test_positional_root_and_server_flags() {
        let settings = parse(&["site", "--host", "0.0.0.0", "-p", "9000"]).cli_settings();

        assert_eq!(settings.root, Some(PathBuf::from("site")));
        assert_eq!(settings.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(settings.port, Some(9000));
    }

    #[test]
    fn test_repeated_watch_flags_collect() {
        let settings = parse(&["-w", "src", "--watch", "assets"]).cli_settings();

        assert_eq!(
            settings.watch_paths,
            Some(vec![PathBuf::from("src"), PathBuf::from("assets")])
        );
    }

    #[test]
    fn test_delay_and_exec() {
        let settings = parse(&["--delay-ms", "250", "-x", "make wasm"]).cli_settings();

        assert_eq!(settings.delay_ms, Some(250));
        assert_eq!(settings.command.as_deref(), Some("make wasm"));
    }

    #[test]
    fn test_no_live_reload_flag() {
        assert_eq!(
            parse(&["--no-live-reload"]).resolve_live_reload_enabled(),
            Some(false)
        );
        assert_eq!(
            parse(&["--live-reload", "true"]).resolve_live_reload_enabled(),
            Some(true)
        );
    }

    #[test]
    fn test_live_reload_flags_conflict() {
        let result = TestCli::try_parse_from(["devsrv", "--live-reload", "true", "--no-live-reload"]);

        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let result = TestCli::try_parse_from(["devsrv", "--port", "70000"]);

        assert!(result.is_err());
    }
}
