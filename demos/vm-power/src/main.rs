use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{info, warn};

use pve_client::{ClientConfig, Proxmox};
use pve_core::{ApiError, WorkerPool};
use pve_observe::{LoggerConfig, logger_init};

// Usage: vm-power <node> <vmid> <start|stop|shutdown|reboot|status> [timeout-secs]
//
// Connection settings come from PVE_HOST, PVE_PORT, PVE_API_TOKEN and PVE_VERIFY_TLS.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    logger_init(&LoggerConfig::from_env()?)?;

    // 2) Arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [node, vmid, action, rest @ ..] = args.as_slice() else {
        bail!("usage: vm-power <node> <vmid> <start|stop|shutdown|reboot|status> [timeout-secs]");
    };
    let vmid: u32 = vmid.parse().context("vmid must be a number")?;
    let timeout = match rest.first() {
        Some(secs) => Duration::from_secs(secs.parse().context("timeout must be seconds")?),
        None => Duration::from_secs(120),
    };

    // 3) Client
    let cfg = ClientConfig::from_env()?;
    let pve = Proxmox::new(&cfg)?;
    let version = pve.version().retry(2).execute().await?;
    info!(version = %version.version, host = %cfg.host, "connected");

    // 4) Action
    let vm = pve.nodes().get(node.as_str()).qemu(vmid);
    let request = match action.as_str() {
        "status" => {
            let status = vm.status().execute().await?;
            info!(vmid, status = %status.status, uptime = status.uptime.unwrap_or(0), "vm status");
            return Ok(());
        }
        "start" => vm.start(),
        "stop" => vm.stop(),
        "shutdown" => vm.shutdown(),
        "reboot" => vm.reboot(),
        other => bail!("unknown action {other:?}"),
    };

    let started = tokio::select! {
        out = request.wait_for_completion().task_timeout(timeout).execute() => out,
        _ = tokio::signal::ctrl_c() => Err(ApiError::Cancelled),
    };
    match started {
        Ok(upid) => info!(vmid, upid = %upid, action = %action, "task finished"),
        Err(ApiError::Timeout(after)) => warn!(vmid, ?after, "task still running; stopped waiting"),
        Err(e) => {
            pve_core::shutdown_shared();
            return Err(e).with_context(|| format!("{action} vm {vmid}"));
        }
    }

    // 5) Shutdown
    WorkerPool::shared().shutdown(Duration::from_secs(5)).await;
    info!("done");
    Ok(())
}
