//! `pagemirror serve` – run the mirroring service and its control socket.

use anyhow::Result;
use pagemirror_core::config;
use pagemirror_core::control;
use pagemirror_core::executor::CurlExecutor;
use pagemirror_core::service::MirrorService;
use pagemirror_core::state_db::StateDb;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::control_socket;

pub async fn run_serve(destination_root: Option<PathBuf>) -> Result<()> {
    let mut cfg = config::load_or_init()?;
    if let Some(root) = destination_root {
        cfg.destination_root = root;
    }
    tracing::debug!("loaded config: {:?}", cfg);

    let db = StateDb::open_default().await?;
    let (service, handle) = MirrorService::new(cfg, db, Arc::new(CurlExecutor::new())).await?;

    let socket_path = control::default_socket_path()?;
    let _listener = control_socket::spawn_listener(handle, &socket_path)?;
    println!("pagemirror listening on {}", socket_path.display());

    // Runs until the process is terminated.
    service.run().await;
    Ok(())
}
