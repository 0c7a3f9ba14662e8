//! Shared helpers for commands that issue requests.

use maprest::config::ConfigFile;
use maprest::engine::{BufferReply, EngineConfig, Reply, ReplyError, RequestListener};
use maprest::logging::{self, LoggingGuard};
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CliError;

/// Load the config file at `path`, or the default one.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Start file and console logging as configured.
pub fn init_logging(config: &ConfigFile, verbose: bool) -> Result<LoggingGuard, CliError> {
    let level = if verbose { "debug" } else { "warn" };
    logging::init_from_settings(&config.logging, level)
        .map_err(|e| CliError::LoggingInit(e.to_string()))
}

/// Body, status and origin of a finished request.
#[derive(Debug)]
pub struct Completed {
    pub body: Vec<u8>,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub from_cache: bool,
}

/// Listener handing the single reply of a command back to the main thread.
pub struct ReplyChannel {
    tx: mpsc::Sender<Result<Completed, ReplyError>>,
}

impl ReplyChannel {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<Result<Completed, ReplyError>>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self { tx }), rx)
    }

    fn forward(&self, reply: &Reply) {
        let result = match reply.error() {
            Some(error) => Err(error.clone()),
            None => Ok(Completed {
                body: reply
                    .sink_as::<BufferReply>()
                    .map(|b| b.data().to_vec())
                    .unwrap_or_default(),
                status: reply.status_code(),
                content_type: reply.content_type().map(str::to_string),
                from_cache: reply.is_from_cache(),
            }),
        };
        let _ = self.tx.send(result);
    }
}

impl RequestListener for ReplyChannel {
    fn notify_for_success(&self, reply: Arc<Reply>) {
        self.forward(&reply);
    }

    fn notify_for_failure(&self, reply: Arc<Reply>) {
        self.forward(&reply);
    }
}

/// Longest time a request can take including every retry, plus slack.
pub fn reply_deadline(engine: &EngineConfig) -> Duration {
    let policy = engine.retry_policy();
    let attempts = policy.max_retries + 1;
    let backoff: Duration = (0..policy.max_retries).map(|a| policy.delay_for(a)).sum();
    engine.request_timeout * attempts + backoff + Duration::from_secs(5)
}

/// Block until the listener hears back or the deadline passes.
pub fn wait_for_reply(
    url: &str,
    rx: &mpsc::Receiver<Result<Completed, ReplyError>>,
    deadline: Duration,
) -> Result<Completed, CliError> {
    match rx.recv_timeout(deadline) {
        Ok(Ok(completed)) => Ok(completed),
        Ok(Err(error)) => Err(CliError::Request {
            url: url.to_string(),
            error,
        }),
        Err(_) => Err(CliError::TimedOut {
            url: url.to_string(),
            waited: deadline,
        }),
    }
}

/// Write the body to `output`, or to stdout when no file was given.
pub fn write_body(body: &[u8], output: Option<&Path>) -> Result<(), CliError> {
    use std::io::Write;

    match output {
        Some(path) => std::fs::write(path, body).map_err(|error| CliError::FileWrite {
            path: path.display().to_string(),
            error,
        }),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(body)
                .and_then(|_| stdout.flush())
                .map_err(|error| CliError::FileWrite {
                    path: "<stdout>".to_string(),
                    error,
                })
        }
    }
}
