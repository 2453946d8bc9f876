use std::sync::Arc;

use crate::config::AppConfig;
use crate::metrics::AppMetrics;
use crate::orion::OrionClient;
use crate::state::{Band, ChannelKind, SharedState};
use crate::sth::SthClient;

/// Shared application context passed to HTTP handlers and the poller.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub sth: SthClient,
    pub orion: OrionClient,
    pub metrics: AppMetrics,
    pub state: SharedState,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        sth: SthClient,
        orion: OrionClient,
        metrics: AppMetrics,
        state: SharedState,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sth,
            orion,
            metrics,
            state,
        }
    }

    pub fn band(&self, channel: ChannelKind) -> Band {
        self.config.channels.band(channel)
    }
}
