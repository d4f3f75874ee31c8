//! Live streaming: session registry, per-session supervision and snapshots.

pub mod session;
pub mod snapshots;

pub use session::{LiveStreamRequest, LiveStreamSession};
pub use snapshots::{SnapshotExtractor, SnapshotGate};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::probe::Toolchain;
use crate::adapters::local::WorkingDirs;
use crate::config::{LiveSettings, SnapshotSettings};
use crate::error::{EngineError, EngineResult};
use crate::ports::events::EventSink;
use crate::ports::node::NodePort;
use crate::ports::process::ProcessLauncher;

/// Collaborators shared by every live session.
#[derive(Clone)]
pub struct LiveContext {
    pub launcher: Arc<dyn ProcessLauncher>,
    pub node: Arc<dyn NodePort>,
    pub events: Arc<dyn EventSink>,
    pub dirs: WorkingDirs,
    pub toolchain: Toolchain,
    pub settings: LiveSettings,
    pub snapshots: SnapshotSettings,
}

/// Running live sessions keyed by video id.
#[derive(Clone)]
pub struct LiveSessionRegistry {
    ctx: LiveContext,
    sessions: Arc<Mutex<HashMap<String, Arc<LiveStreamSession>>>>,
}

impl LiveSessionRegistry {
    pub fn new(ctx: LiveContext) -> Self {
        Self {
            ctx,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn start(&self, request: LiveStreamRequest) -> EngineResult<Arc<LiveStreamSession>> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&request.video_id) {
            return Err(EngineError::LiveSessionExists(request.video_id));
        }
        let capacity = self.ctx.settings.max_sessions;
        if sessions.len() >= capacity {
            return Err(EngineError::LiveCapacityReached(capacity));
        }

        let (session, handle) = LiveStreamSession::launch(self.ctx.clone(), request)?;
        sessions.insert(session.video_id().to_string(), session.clone());
        drop(sessions);

        info!(
            video_id = %session.video_id(),
            resolution = %session.request().resolution,
            record_locally = session.request().record_locally,
            record_remotely = session.request().record_remotely,
            "live stream started"
        );
        session.mark_running().await;

        let registry = self.clone();
        let driven = session.clone();
        tokio::spawn(async move {
            driven.drive(handle).await;
            registry.remove(&driven).await;
            driven.mark_finished();
        });
        Ok(session)
    }

    pub async fn stop(&self, video_id: &str) -> EngineResult<()> {
        let session = self
            .get(video_id)
            .await
            .ok_or_else(|| EngineError::UnknownLiveSession(video_id.to_string()))?;
        session.stop().await;
        Ok(())
    }

    pub async fn stop_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().await.values().cloned().collect();
        for session in sessions {
            session.stop().await;
            session.finished().await;
        }
    }

    pub async fn get(&self, video_id: &str) -> Option<Arc<LiveStreamSession>> {
        self.sessions.lock().await.get(video_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn remove(&self, session: &Arc<LiveStreamSession>) {
        let mut sessions = self.sessions.lock().await;
        let current = sessions
            .get(session.video_id())
            .map_or(false, |registered| Arc::ptr_eq(registered, session));
        if current {
            sessions.remove(session.video_id());
        }
    }
}
