//! Gateway server

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::auth::AuthGateway;
use super::negotiate::SpnegoNegotiator;
use super::router::create_router;
use super::signer::Signer;
use crate::config::Config;
use crate::directory::{RoleDirectory, StaticRoleDirectory};
use crate::{Error, Result};

/// Authentication gateway server
pub struct Gateway {
    config: Config,
    auth: Arc<AuthGateway>,
}

impl Gateway {
    /// Assemble the gateway from configuration: token signer, negotiator,
    /// and role directory.
    pub fn new(config: Config) -> Result<Self> {
        let signer = match &config.sso.signature_secret_file {
            Some(path) if !path.is_empty() => Arc::new(Signer::from_secret_file(Path::new(path))?),
            _ => {
                warn!("no signature secret file configured, using an ephemeral secret");
                Arc::new(Signer::ephemeral())
            }
        };

        let directory: Arc<dyn RoleDirectory> = match &config.directory.roles_file {
            Some(path) if !path.is_empty() => {
                let dir = StaticRoleDirectory::from_file(Path::new(path))?;
                info!(roles_file = %path, "role directory loaded");
                Arc::new(dir)
            }
            _ => Arc::new(StaticRoleDirectory::new()),
        };

        let negotiator = Arc::new(SpnegoNegotiator::new(config.sso.clone(), signer));
        if !negotiator.service_principal().is_empty() {
            info!(principal = %negotiator.service_principal(), "negotiation service principal");
        }

        let auth = Arc::new(AuthGateway::new(
            config.sso.clone(),
            directory,
            negotiator,
        ));

        Ok(Self { config, auth })
    }

    /// Run the gateway until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = create_router(Arc::clone(&self.auth));
        let listener = TcpListener::bind(addr).await?;

        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            cookie = %self.config.sso.cookie_name,
            alt_negotiation = self.config.sso.alt_negotiation_enabled,
            restrict_non_admin_ui = self.config.sso.restrict_non_admin_ui,
            "Authentication gateway active"
        );
        if !self.config.sso.portal.is_empty() {
            info!(
                portal = %self.config.sso.portal,
                account = %self.config.sso.account_id,
                cluster = %self.config.sso.cluster_id,
                "SSO portal configured"
            );
        }
        if self.config.sso.restrict_non_admin_ui {
            info!("UI access is restricted to administrative roles");
        }

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            warn!("failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => {
                warn!("failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
