//! LIMS Server - HTTP surface for the case tracker
//!
//! Wires [`CaseService`] to its production collaborators (SVG QR codes, the
//! Dropbox mirror) and exposes it over warp.

#![warn(unreachable_pub)]

pub mod logging;
pub mod multipart;
pub mod pages;
pub mod routes;

pub use routes::{routes, AppState};

use lims_core::{
    CaseService, EmployeeDirectory, LimsConfig, LimsError, LimsResult, QrRenderer, RemoteStore,
};
use lims_mirror::DropboxMirror;
use lims_qr::SvgQrRenderer;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

/// Resolve configuration: defaults, then the TOML file, then the environment
///
/// # Errors
/// `LimsError::Config` / `LimsError::Io` for unreadable or invalid sources
pub async fn load_config(path: Option<&Path>) -> LimsResult<LimsConfig> {
    let config = match path {
        Some(path) => LimsConfig::load(path).await?,
        None => LimsConfig::new(),
    };
    let config = config.apply_process_env()?;
    config.validate()?;
    Ok(config)
}

/// Employee registry from the configured file, or the built-in roster
///
/// # Errors
/// `LimsError::Config` / `LimsError::Io` if the file is unusable
pub async fn load_directory(config: &LimsConfig) -> LimsResult<EmployeeDirectory> {
    match &config.employees_file {
        Some(path) => EmployeeDirectory::load(path).await,
        None => Ok(EmployeeDirectory::builtin()),
    }
}

/// Build the service with production collaborators
///
/// The mirror is enabled only when Dropbox credentials are complete.
///
/// # Errors
/// Propagates directory loading and HTTP client construction failures
pub async fn build_service(config: &LimsConfig) -> LimsResult<Arc<CaseService>> {
    let directory = Arc::new(load_directory(config).await?);
    let renderer: Arc<dyn QrRenderer> = Arc::new(SvgQrRenderer::new());

    let remote: Option<Arc<dyn RemoteStore>> = match config.dropbox.credentials() {
        Some(credentials) => Some(Arc::new(DropboxMirror::new(credentials)?)),
        None => {
            tracing::info!("dropbox credentials incomplete, mirror disabled");
            None
        }
    };

    tracing::info!(
        employees = directory.len(),
        cases_root = %config.cases_root.display(),
        mirror = remote.is_some(),
        "service configured"
    );
    Ok(Arc::new(CaseService::new(config, directory, renderer, remote)))
}

/// Run the startup pass, then serve until Ctrl-C
///
/// # Errors
/// `LimsError::Config` if the bind address is invalid or cannot be bound
pub async fn serve(config: &LimsConfig, service: Arc<CaseService>) -> LimsResult<()> {
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .map_err(|e| LimsError::Config(format!("invalid bind address {}: {e}", config.bind_addr())))?;

    service.startup(config.startup_sync).await;

    let state = AppState::new(service, &config.log_file, &config.qr_dir);
    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .map_err(|e| LimsError::Config(format!("cannot bind {addr}: {e}")))?;

    tracing::info!(addr = %bound, public = %config.public_base_url(), "listening");
    server.await;
    Ok(())
}
