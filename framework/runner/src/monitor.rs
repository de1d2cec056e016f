use std::time::Duration;

use gust_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, System};

/// Warn when the load generator itself is running hot.
///
/// A saturated generator queues work locally and inflates every latency sample, so the numbers
/// would say more about this process than about the target. This does not stop the run, it
/// only tells the user their results may be skewed.
pub(crate) fn start_monitor(shutdown_listener: DelegatedShutdownListener) {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu();
            let cpu_count = sys.cpus().len().max(1);

            loop {
                if shutdown_listener.should_shutdown() {
                    break;
                }

                sys.refresh_process_specifics(this_process_pid, ProcessRefreshKind::new().with_cpu());

                if let Some(process) = sys.process(this_process_pid) {
                    let usage = process.cpu_usage() / cpu_count as f32;
                    if usage > 75.0 {
                        log::warn!(
                            "The load generator is using {usage:.1}% of {cpu_count} cores; latency measurements may be skewed"
                        );
                    }
                }

                std::thread::sleep(Duration::from_secs(1));
            }
        })
        .expect("Failed to start monitor thread");
}
