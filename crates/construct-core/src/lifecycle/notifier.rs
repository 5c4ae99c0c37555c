//! Install/uninstall telemetry seam
//!
//! The orchestrator reports lifecycle events through this trait and only
//! ever logs a failure, so a misbehaving telemetry channel cannot block a
//! legitimate install. The default notifier does nothing.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::registry::{InstallEvent, RegistryClient, UninstallEvent};

#[async_trait]
pub trait InstallNotifier: Send + Sync {
    async fn installed(&self, event: &InstallEvent) -> Result<()>;
    async fn uninstalled(&self, event: &UninstallEvent) -> Result<()>;
}

/// No-op notifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl InstallNotifier for NullNotifier {
    async fn installed(&self, _event: &InstallEvent) -> Result<()> {
        Ok(())
    }

    async fn uninstalled(&self, _event: &UninstallEvent) -> Result<()> {
        Ok(())
    }
}

/// Notifier that posts events to the registry's telemetry endpoints.
pub struct HttpNotifier {
    client: Arc<RegistryClient>,
}

impl HttpNotifier {
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InstallNotifier for HttpNotifier {
    async fn installed(&self, event: &InstallEvent) -> Result<()> {
        self.client.notify_install(event).await
    }

    async fn uninstalled(&self, event: &UninstallEvent) -> Result<()> {
        self.client.notify_uninstall(event).await
    }
}
