//! `embermug reconnect`: ask a running service to reconnect to the mug.

use embermug_config::Config;
use embermug_core::Message;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub async fn handle(global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let path = super::socket_path(global, cfg);
    let stream = super::watch::connect(&path).await?;
    let (read, mut write) = stream.into_split();

    // Wait for the greeting so the session is up before we speak.
    let mut lines = BufReader::new(read).lines();
    if let Some(greeting) = lines.next_line().await? {
        debug!(%greeting, "service greeting");
    }

    let mut request = serde_json::to_string(&Message::reconnect())?;
    request.push('\n');
    write.write_all(request.as_bytes()).await?;
    write.shutdown().await?;

    eprintln!("Reconnect requested");
    Ok(())
}
