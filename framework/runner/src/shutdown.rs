use longevity_core::prelude::InterruptHandle;
use tokio::signal;

/// Fire the run-wide interrupt on Ctrl-C. The running scenario is interrupted, its after hooks
/// still run, and every scenario after it is skipped.
pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<InterruptHandle> {
    let handle = InterruptHandle::new();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {:?}", e);
            return;
        }
        listener_handle.interrupt();
        println!("Received shutdown signal, finishing the current scenario's teardown...");
    });

    Ok(handle)
}
