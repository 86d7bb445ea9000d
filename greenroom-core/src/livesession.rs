use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use log::{info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Issues and reclaims ephemeral media rooms. The credential format belongs
/// to the media service; the platform treats it as opaque.
#[async_trait]
pub trait LiveSessionGateway: Send + Sync + 'static {
    async fn issue_credential(
        &self,
        room_name: &str,
        identity: &str,
    ) -> Result<RoomCredential, GatewayError>;

    /// Deletes a room. Deleting an absent room is treated as a normal error
    /// by the service; callers handle it as non-fatal.
    async fn delete_room(&self, room_name: &str) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomCredential {
    pub token: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Live session request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Live session service rejected the request with status {0}")]
    Rejected(StatusCode),
}

/// Configuration for the HTTP live-session gateway
#[derive(Debug, Clone)]
pub struct LiveSessionApiConfig {
    pub base_url: String,
    pub api_key: String,
}

/// Talks to the external media service over HTTP
pub struct HttpLiveSessionGateway {
    client: Client,
    config: LiveSessionApiConfig,
}

impl HttpLiveSessionGateway {
    pub fn new(config: LiveSessionApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl LiveSessionGateway for HttpLiveSessionGateway {
    async fn issue_credential(
        &self,
        room_name: &str,
        identity: &str,
    ) -> Result<RoomCredential, GatewayError> {
        let response = self
            .client
            .post(format!("{}/token", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "roomName": room_name,
                "participantName": identity,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Rejected(response.status()));
        }

        Ok(response.json::<RoomCredential>().await?)
    }

    async fn delete_room(&self, room_name: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(format!("{}/rooms/{room_name}", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Rejected(response.status()));
        }

        Ok(())
    }
}

/// Default room lifetime before reclamation, five minutes
pub const DEFAULT_ROOM_TTL: Duration = Duration::from_millis(300_000);

/// Per-room reclamation countdowns. At most one timer is live per room;
/// starting a new one replaces the prior schedule. Reclamation is best-effort:
/// the media service expires idle rooms on its own as a backstop.
pub struct RoomTimers<G> {
    gateway: Arc<G>,
    tasks: Arc<DashMap<String, JoinHandle<()>>>,
    default_ttl: Duration,
}

impl<G> Clone for RoomTimers<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            tasks: self.tasks.clone(),
            default_ttl: self.default_ttl,
        }
    }
}

impl<G> RoomTimers<G>
where
    G: LiveSessionGateway,
{
    pub fn new(gateway: &Arc<G>, default_ttl: Duration) -> Self {
        Self {
            gateway: gateway.clone(),
            tasks: Default::default(),
            default_ttl,
        }
    }

    /// Schedules reclamation of a room, replacing any prior timer for it
    pub fn start(&self, room_name: &str, duration: Option<Duration>) {
        let duration = duration.unwrap_or(self.default_ttl);

        if let Some((_, prior)) = self.tasks.remove(room_name) {
            prior.abort();
        }

        let gateway = self.gateway.clone();
        let tasks = self.tasks.clone();
        let room = room_name.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            tasks.remove(&room);

            info!("Reclaiming live room {room}");

            if let Err(error) = gateway.delete_room(&room).await {
                warn!("Failed to reclaim live room {room}: {error}");
            }
        });

        self.tasks.insert(room_name.to_string(), handle);
    }

    /// Cancels the timer for a room. A no-op when no timer is scheduled.
    /// A callback already dequeued by the scheduler may still fire; that is
    /// safe because room deletion is idempotent on the service side.
    pub fn cancel(&self, room_name: &str) {
        if let Some((_, handle)) = self.tasks.remove(room_name) {
            handle.abort();
        }
    }

    pub fn is_scheduled(&self, room_name: &str) -> bool {
        self.tasks.contains_key(room_name)
    }
}

/// Live-session entry point: hands out room credentials and arms the
/// room's reclamation timer in the same breath.
pub struct LiveSessions<G> {
    gateway: Arc<G>,
    timers: RoomTimers<G>,
}

impl<G> LiveSessions<G>
where
    G: LiveSessionGateway,
{
    pub fn new(gateway: &Arc<G>, timers: &RoomTimers<G>) -> Self {
        Self {
            gateway: gateway.clone(),
            timers: timers.clone(),
        }
    }

    /// Issues a credential for a room and starts its reclamation countdown
    pub async fn open(
        &self,
        room_name: &str,
        identity: &str,
    ) -> Result<RoomCredential, GatewayError> {
        let credential = self.gateway.issue_credential(room_name, identity).await?;

        self.timers.start(room_name, None);

        info!("Issued live session credential for room {room_name}");

        Ok(credential)
    }
}
