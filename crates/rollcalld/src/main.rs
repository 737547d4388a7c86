use anyhow::{Context, Result};
use rollcall_core::OnnxProvider;
use rollcall_roster::AttendanceService;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use dbus_interface::{RollcallService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = config::Config::load()?;
    tracing::info!(
        faces_dir = %config.faces_dir.display(),
        attendance_log = %config.attendance_log.display(),
        threshold = config.match_threshold,
        "configuration loaded"
    );

    let service = Arc::new(AttendanceService::open(
        &config.faces_dir,
        &config.attendance_log,
        config.service_config(),
    )?);

    let mut provider = OnnxProvider::load(&config.scrfd_model_path(), &config.arcface_model_path())
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;

    let report = service.reload(&mut provider)?;
    tracing::info!(loaded = report.loaded, skipped = report.skipped, "enrollment store loaded");

    let engine = engine::spawn_engine(provider, Arc::clone(&service))?;
    let iface = RollcallService::new(engine, service);

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, iface)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(
        bus = if config.system_bus { "system" } else { "session" },
        name = BUS_NAME,
        "rollcalld ready"
    );

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
