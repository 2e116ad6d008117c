use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::temp_token::TempTokenService;

/// Background loop reclaiming the files of expired and revoked temp tokens.
#[derive(Clone)]
pub struct TokenSweepService {
    tokens: TempTokenService,
    period: Duration,
}

impl TokenSweepService {
    pub fn new(tokens: TempTokenService, period: Duration) -> Self {
        Self { tokens, period }
    }

    /// Start the background sweep task
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.period);

            loop {
                sweep_interval.tick().await;

                tracing::debug!("Starting scheduled temp token sweep");

                match self.tokens.sweep().await {
                    Ok(reclaimed) => {
                        tracing::debug!(reclaimed, "Temp token sweep completed");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Temp token sweep failed");
                    }
                }
            }
        })
    }
}
