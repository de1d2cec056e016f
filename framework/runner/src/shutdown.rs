use gust_core::prelude::ShutdownHandle;
use tokio::signal;

/// Start listening for interactive interrupts.
///
/// The first Ctrl-C raises the graceful stop signal and the run drains normally. A second
/// Ctrl-C abandons the grace period and terminates the process immediately.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl-C signal");
        println!("Received shutdown signal, finishing in-flight work (Ctrl-C again to exit immediately)...");
        listener_handle.shutdown();

        signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl-C signal");
        log::warn!("Second interrupt received, exiting immediately");
        std::process::exit(1);
    });

    handle
}
