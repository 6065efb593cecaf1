//! Host process flow: load engines, init, load scripts, run, quit.

use crate::config::Config;
use anyhow::Context;
use pioe_runtime::{Host, HostError, HostResult};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long shutdown waits for frame bodies still running on the blocking
/// pool. A frame that never returns would otherwise keep the process alive.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Run `future` on a fresh multi-threaded runtime, then shut the runtime
/// down without waiting longer than [`SHUTDOWN_GRACE`] for detached frames.
pub fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

/// Run `host` as configured until it is stopped, then quit it.
///
/// Only fatal errors abort startup. An engine or script that fails to load
/// is reported and skipped; the host refuses to run only when no engine is
/// left.
pub async fn serve(host: &mut Host, config: &Config) -> HostResult<()> {
    let result = drive(host, config).await;
    let quit = host.quit();
    result.and(quit)
}

async fn drive(host: &mut Host, config: &Config) -> HostResult<()> {
    for key in &config.engines.load {
        match host.load_engine(key) {
            Ok(descriptor) => info!(
                engine = %descriptor.name,
                language = %descriptor.script_language,
                "Engine ready"
            ),
            Err(e) => tolerate(e)?,
        }
    }

    match host.init() {
        Ok(()) => {}
        Err(e @ HostError::FanOut { .. }) => warn!("{}", e),
        Err(e) => return Err(e),
    }

    for script in &config.scripts.load {
        if let Err(e) = host.load_script(script) {
            tolerate(e)?;
        }
    }

    host.run().await
}

fn tolerate(e: HostError) -> HostResult<()> {
    if e.is_fatal() {
        return Err(e);
    }
    error!("{}", e);
    Ok(())
}
