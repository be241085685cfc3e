//! Subcommand drivers
//!
//! Wire a session to the local terminal: remote output to stdout/stderr,
//! local stdin to console input, Ctrl-C to `close()`.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use shellwire_core::{
    CommandOutcome, CommandRequest, CommandSession, ConsoleSession, ConsoleState, Endpoint,
    EnvVar, OutputStream, SessionConfig, SessionError,
};

/// Exit status when the session ended before a result
const ABNORMAL_EXIT: u8 = 255;

/// Exit status when the server reported an error
const REMOTE_ERROR_EXIT: u8 = 1;

/// Map a remote status onto a process exit status
fn exit_byte(status: i32) -> u8 {
    u8::try_from(status.rem_euclid(256)).unwrap_or(ABNORMAL_EXIT)
}

/// Exit status for a finished command session
fn command_exit(outcome: &Result<CommandOutcome, SessionError>) -> Option<u8> {
    match outcome {
        Ok(CommandOutcome::Completed(result)) => {
            Some(result.status().map_or(ABNORMAL_EXIT, exit_byte))
        }
        Ok(CommandOutcome::Abnormal) => Some(ABNORMAL_EXIT),
        Err(SessionError::RemoteExecution(_)) => Some(REMOTE_ERROR_EXIT),
        Err(_) => None,
    }
}

/// Copy a stream to a local writer until it ends
async fn pump<W>(stream: Option<OutputStream>, mut out: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Some(mut stream) = stream else {
        return Ok(());
    };
    while let Some(chunk) = stream.next_chunk().await {
        out.write_all(&chunk).await?;
        out.flush().await?;
    }
    Ok(())
}

/// Run one command, streaming its output
pub async fn exec(
    endpoint: Endpoint,
    config: SessionConfig,
    request: CommandRequest,
) -> Result<ExitCode> {
    let mut session = CommandSession::new(endpoint, request)?.with_config(config);
    session.start().await.context("Failed to start command")?;

    let stdout = session.take_stdout();
    let stderr = session.take_stderr();

    let session = Arc::new(session);
    let interrupt = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, closing session");
                session.close();
            }
        })
    };

    let (out, err) = tokio::join!(
        pump(stdout, tokio::io::stdout()),
        pump(stderr, tokio::io::stderr())
    );
    out.context("Failed to write stdout")?;
    err.context("Failed to write stderr")?;

    let outcome = session.wait().await;
    interrupt.abort();

    match &outcome {
        Ok(CommandOutcome::Completed(result)) if result.truncated => {
            warn!("Remote output was truncated");
        }
        Ok(CommandOutcome::Abnormal) => {
            error!("Connection ended before the command finished");
        }
        Err(SessionError::RemoteExecution(message)) => {
            eprintln!("shellwire: remote error: {message}");
        }
        _ => {}
    }

    match command_exit(&outcome) {
        Some(code) => Ok(ExitCode::from(code)),
        None => outcome
            .map(|_| ExitCode::from(ABNORMAL_EXIT))
            .context("Command session failed"),
    }
}

/// Attach a console until the remote side closes, stdin ends or Ctrl-C
pub async fn console(
    endpoint: Endpoint,
    config: SessionConfig,
    env: Vec<EnvVar>,
) -> Result<ExitCode> {
    let mut session = ConsoleSession::new(endpoint)
        .with_env(env)?
        .with_config(config);
    session.start().await.context("Failed to open console")?;

    if session.state() == ConsoleState::Closed {
        warn!("Console closed during startup");
    }

    let output = tokio::spawn(pump(session.take_output(), tokio::io::stdout()));
    let input = session.input();
    let mut stdin = tokio::io::stdin();
    let mut buf = vec![0u8; 4096];

    let ended = loop {
        tokio::select! {
            read = stdin.read(&mut buf) => match read.context("Failed to read stdin")? {
                0 => {
                    info!("Stdin closed, closing console");
                    break Ok(());
                }
                n => input.write(&buf[..n]),
            },
            result = session.closed() => break result,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing console");
                break Ok(());
            }
        }
    };

    session.close();
    output
        .await
        .context("Output task failed")?
        .context("Failed to write stdout")?;

    match ended {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %e, "Console ended with an error");
            Ok(ExitCode::from(ABNORMAL_EXIT))
        }
    }
}
