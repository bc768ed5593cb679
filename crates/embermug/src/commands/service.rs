//! `embermug service`: the long-running daemon.

use embermug_config::Config;
use embermug_core::Service;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{DeviceArgs, GlobalOpts};
use crate::error::CliError;
use crate::{device, shutdown, socket};

// Without Bluetooth the adapter type is uninhabited.
#[cfg_attr(not(feature = "bluetooth"), allow(unreachable_code))]
pub async fn handle(args: DeviceArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let config = super::service_config(args.address.as_deref(), cfg)?;
    let path = super::socket_path(global, cfg);
    let adapter = device::open("service").await?;

    let (listener, _guard) = socket::listen(&path).await?;
    let cancel = CancellationToken::new();
    let signals = shutdown::cancel_on_signals(cancel.clone())?;

    info!(
        address = %config.address,
        socket = %path.display(),
        attempts = config.connect_attempts,
        "embermug service starting"
    );
    let service = Service::new(adapter, config);
    let result = service.run(listener, cancel.clone()).await;

    cancel.cancel();
    let _ = signals.await;
    result.map_err(CliError::from)
}
