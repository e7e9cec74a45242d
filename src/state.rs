use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

use crate::config::ServerConfig;
use crate::core::collaborators::{self, Collaborators};
use crate::core::registry::SessionRegistry;
use crate::core::session::SessionSettings;

/// Why a WebSocket connection was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
    PerIpLimitReached,
}

/// State shared by every request handler
pub struct AppState {
    pub config: ServerConfig,
    pub collaborators: Collaborators,
    pub sessions: SessionRegistry,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, usize>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("address", &self.config.address())
            .field("sessions", &self.sessions.len())
            .field("ws_connections", &self.ws_connection_count())
            .finish()
    }
}

impl AppState {
    /// Build state with the HTTP collaborators described by `config`
    pub async fn new(config: ServerConfig) -> anyhow::Result<Arc<Self>> {
        let collaborators = collaborators::from_config(&config)?;
        if config.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not set; transcription and generation will fail");
        }
        if config.elevenlabs_api_key.is_none() {
            warn!("ELEVENLABS_API_KEY not set; synthesis will fail");
        }
        Ok(Self::with_collaborators(config, collaborators))
    }

    /// Build state around caller-supplied collaborators
    pub fn with_collaborators(config: ServerConfig, collaborators: Collaborators) -> Arc<Self> {
        Arc::new(Self {
            config,
            collaborators,
            sessions: SessionRegistry::new(),
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings::from_config(&self.config)
    }

    /// Reserve a WebSocket slot for `ip`, enforcing the global and per-IP limits
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let per_ip_limit = self.config.max_connections_per_ip as usize;
        // The entry guard serializes acquisitions for one IP
        let mut per_ip = self.ip_connections.entry(ip).or_insert(0);
        if *per_ip >= per_ip_limit {
            return Err(ConnectionLimitError::PerIpLimitReached);
        }

        if let Some(max) = self.config.max_websocket_connections {
            let reserved = self
                .ws_connections
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < max).then_some(current + 1)
                });
            if reserved.is_err() {
                let empty = *per_ip == 0;
                drop(per_ip);
                if empty {
                    self.ip_connections.remove_if(&ip, |_, count| *count == 0);
                }
                return Err(ConnectionLimitError::GlobalLimitReached);
            }
        } else {
            self.ws_connections.fetch_add(1, Ordering::AcqRel);
        }

        *per_ip += 1;
        Ok(())
    }

    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
        self.ip_connections
            .remove_if_mut(&ip, |_, count| {
                *count = count.saturating_sub(1);
                *count == 0
            });
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> usize {
        self.ip_connections.get(ip).map(|count| *count).unwrap_or(0)
    }
}
