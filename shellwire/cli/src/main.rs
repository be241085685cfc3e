//! Shellwire - Remote Commands and Consoles over WebSocket
//!
//! Command-line client for the shellwire session protocol. Runs one command
//! with streamed output, or attaches an interactive console.
//!
//! # Usage
//!
//! ```bash
//! # Run a command, exit with its status
//! shellwire --url wss://host/v1/sandboxes/dev/exec exec -- ls -la /tmp
//!
//! # Pass environment variables
//! shellwire exec -e RUST_LOG=debug -e MODE=ci -- ./run-tests.sh
//!
//! # Attach a console with injected environment
//! shellwire --url wss://host/v1/sandboxes/dev/console console -e EDITOR=vim
//!
//! # Verbose logging (to stderr)
//! RUST_LOG=debug shellwire exec -- uname -a
//! ```
//!
//! # Exit Status
//!
//! - `exec`: the remote status; 124 if the command timed out, 255 if the
//!   connection ended before a result, 1 if the server reported an error
//! - `console`: 0 when the session ends normally, 255 on a transport fault

mod run;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use shellwire_core::{
    load_config, load_config_from_path, BearerToken, ClientConfig, CommandRequest,
    ConfigOverrides, EnvVar,
};

/// Shellwire - run remote commands and consoles over WebSocket
#[derive(Parser, Debug)]
#[command(name = "shellwire")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Session endpoint URL (ws:// or wss://)
    #[arg(short = 'u', long, value_name = "URL")]
    url: Option<String>,

    /// Bearer token
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// File containing the bearer token
    #[arg(long, value_name = "FILE")]
    token_file: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "SHELLWIRE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Handshake timeout in milliseconds
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Do not send keepalive pings
    #[arg(long)]
    no_heartbeat: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SHELLWIRE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Session to run
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command and stream its output
    Exec {
        /// Allocate a terminal on the remote side
        #[arg(short = 't', long)]
        tty: bool,

        /// Environment variable for the command
        #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
        env: Vec<EnvVar>,

        /// Program and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Attach an interactive console
    Console {
        /// Environment variable to inject before the console opens
        #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
        env: Vec<EnvVar>,
    },
}

/// Initialize logging with the specified level
///
/// Logs go to stderr; stdout carries remote output only.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("shellwire={level},shellwire_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(())
}

/// Load configuration and apply command-line overrides
fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            load_config_from_path(Some(path.clone()))
        }
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    apply_overrides(args, &mut config)?;

    config.validate().context("Invalid configuration")?;
    debug!(source = %config.source(), "Configuration resolved");
    Ok(config)
}

/// Apply command-line flags on top of a loaded configuration
fn apply_overrides(args: &Args, config: &mut ClientConfig) -> Result<()> {
    let mut overrides = ConfigOverrides::new();
    if let Some(url) = &args.url {
        overrides = overrides.with_url(url.clone());
    }
    if let Some(token) = &args.token {
        let token = BearerToken::new(token.as_str()).context("Invalid --token")?;
        overrides = overrides.with_token(token);
    }
    if let Some(path) = &args.token_file {
        overrides = overrides.with_token_file(path.clone());
    }
    if let Some(ms) = args.connect_timeout_ms {
        overrides = overrides.with_connect_timeout_ms(ms);
    }
    if args.no_heartbeat {
        overrides = overrides.with_heartbeat_enabled(false);
    }
    overrides.apply(config);
    Ok(())
}

async fn dispatch(args: Args) -> Result<ExitCode> {
    let config = resolve_config(&args)?;
    let endpoint = config.endpoint().context("Cannot determine endpoint")?;
    info!(url = %endpoint.url, "Using endpoint");

    match args.command {
        Command::Exec { tty, env, command } => {
            let request = CommandRequest::new(command).with_tty(tty).with_envs(env);
            run::exec(endpoint, config.session, request).await
        }
        Command::Console { env } => run::console(endpoint, config.session, env).await,
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(dispatch(args));

    // A console may leave a blocking stdin read behind
    runtime.shutdown_timeout(Duration::from_millis(100));

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use shellwire_core::ConfigSource;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_exec() {
        let args = Args::try_parse_from([
            "shellwire",
            "--url",
            "ws://localhost/exec",
            "exec",
            "-t",
            "-e",
            "A=1",
            "--",
            "ls",
            "-la",
        ])
        .unwrap();

        assert_eq!(args.url.as_deref(), Some("ws://localhost/exec"));
        let Command::Exec { tty, env, command } = args.command else {
            panic!("expected exec");
        };
        assert!(tty);
        assert_eq!(env, vec![EnvVar::new("A", "1")]);
        assert_eq!(command, vec!["ls".to_string(), "-la".to_string()]);
    }

    #[test]
    fn test_parse_exec_requires_command() {
        assert!(Args::try_parse_from(["shellwire", "exec"]).is_err());
    }

    #[test]
    fn test_parse_console_env() {
        let args =
            Args::try_parse_from(["shellwire", "--no-heartbeat", "console", "-e", "GREETING=a=b"])
                .unwrap();
        assert!(args.no_heartbeat);
        let Command::Console { env } = args.command else {
            panic!("expected console");
        };
        assert_eq!(env, vec![EnvVar::new("GREETING", "a=b")]);
    }

    #[test]
    fn test_parse_rejects_bad_env() {
        assert!(Args::try_parse_from(["shellwire", "console", "-e", "NOEQUALS"]).is_err());
    }

    #[test]
    fn test_overrides_apply_to_loaded_config() {
        let args = Args::try_parse_from([
            "shellwire",
            "--url",
            "ws://localhost:9000/exec",
            "--token",
            "abc",
            "--connect-timeout-ms",
            "1500",
            "--no-heartbeat",
            "exec",
            "true",
        ])
        .unwrap();

        let mut config = ClientConfig::new();
        apply_overrides(&args, &mut config).unwrap();

        let endpoint = config.endpoint().unwrap();
        assert_eq!(endpoint.url, "ws://localhost:9000/exec");
        assert_eq!(endpoint.token.expose(), "abc");
        assert_eq!(
            config.session.connection.connect_timeout,
            Duration::from_millis(1500)
        );
        assert!(!config.session.connection.heartbeat.enabled);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_invalid_token_flag_is_an_error() {
        let args = Args::try_parse_from(["shellwire", "--token", "", "console"]).unwrap();
        assert!(apply_overrides(&args, &mut ClientConfig::new()).is_err());
    }

    #[test]
    fn test_resolve_config_reads_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
[endpoint]
url = "ws://from-file/exec"

[connection]
connect_timeout_ms = 2500

[session]
output_capacity = 7
"#,
        )
        .unwrap();

        let args = Args::try_parse_from([
            "shellwire",
            "--config",
            file.path().to_str().unwrap(),
            "--url",
            "ws://localhost:9000/exec",
            "--token",
            "abc",
            "exec",
            "true",
        ])
        .unwrap();

        let config = resolve_config(&args).unwrap();
        assert_eq!(config.url.as_deref(), Some("ws://localhost:9000/exec"));
        assert_eq!(config.session.output_capacity, 7);
        assert_eq!(
            config.session.connection.connect_timeout,
            Duration::from_millis(2500)
        );
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let args = Args::try_parse_from([
            "shellwire",
            "--config",
            "/nonexistent/shellwire.toml",
            "console",
        ])
        .unwrap();
        assert!(resolve_config(&args).is_err());
    }
}
