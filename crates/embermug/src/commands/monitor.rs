//! `embermug monitor`: follow the mug directly, JSON lines on stdout.

use embermug_config::Config;
use tokio_util::sync::CancellationToken;

use crate::cli::DeviceArgs;
use crate::error::CliError;
use crate::{device, shutdown};

// Without Bluetooth the adapter type is uninhabited.
#[cfg_attr(not(feature = "bluetooth"), allow(unreachable_code))]
pub async fn handle(args: DeviceArgs, cfg: &Config) -> Result<(), CliError> {
    let config = super::service_config(args.address.as_deref(), cfg)?;
    let adapter = device::open("monitor").await?;

    let cancel = CancellationToken::new();
    let signals = shutdown::cancel_on_signals(cancel.clone())?;
    let result = embermug_core::monitor(&adapter, &config, tokio::io::stdout(), cancel.clone()).await;
    cancel.cancel();
    let _ = signals.await;

    match result {
        // The reader of our stdout went away, e.g. `| head -n1`.
        Err(e) if e.is_hangup() => Ok(()),
        other => other.map_err(CliError::from),
    }
}
