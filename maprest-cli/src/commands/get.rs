//! `get` - issue one REST request through the engine.

use clap::Args;
use maprest::config::ConfigFile;
use maprest::engine::{BufferReply, EngineConfig, RestEngine};
use std::path::PathBuf;
use tracing::debug;

use super::common::{reply_deadline, wait_for_reply, write_body, ReplyChannel};
use crate::error::CliError;

/// Arguments for `maprest get`.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Fully formed request URL
    pub url: String,

    /// Send a POST request with this body instead of a GET
    #[arg(long)]
    pub post: Option<String>,

    /// Write the response body to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Run the get command.
pub fn run(args: GetArgs, config: &ConfigFile) -> Result<(), CliError> {
    let engine_config = EngineConfig::from(config);
    let deadline = reply_deadline(&engine_config);
    let engine = RestEngine::new(engine_config)?;
    let (listener, rx) = ReplyChannel::new();

    let id = match &args.post {
        Some(body) => engine.open_post(&args.url, body.as_bytes(), &listener, BufferReply::new()),
        None => engine.open_get(&args.url, &listener, BufferReply::new()),
    };
    if !id.is_valid() {
        return Err(CliError::Refused {
            url: args.url,
            reason: "engine did not accept the request".to_string(),
        });
    }
    debug!(request_id = %id, url = %args.url, "Request submitted");

    let completed = wait_for_reply(&args.url, &rx, deadline)?;
    engine.shutdown();

    eprintln!(
        "HTTP {} ({} bytes{})",
        completed.status.unwrap_or(200),
        completed.body.len(),
        completed
            .content_type
            .as_deref()
            .map(|ct| format!(", {}", ct))
            .unwrap_or_default()
    );
    write_body(&completed.body, args.output.as_deref())
}
