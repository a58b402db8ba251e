use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::{self, models::Donation, DbPool};
use crate::impact::{self, ImpactSummary};

/// What every connected dashboard receives: the complete ordered list plus
/// the aggregates derived from it.
#[derive(Serialize, Debug, Clone)]
pub struct DonationsSnapshot {
    pub donations: Vec<Donation>,
    pub impact: ImpactSummary,
}

/// In-process fan-out of donation snapshots. Writers publish after every
/// committed change; each WebSocket client holds a receiver until it
/// disconnects.
#[derive(Clone)]
pub struct DonationFeed {
    tx: broadcast::Sender<String>,
}

impl DonationFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Builds the current snapshot from the store and pushes it to all
    /// subscribers. A send error only means nobody is listening.
    pub async fn publish(&self, pool: &DbPool) -> anyhow::Result<()> {
        let payload = self.snapshot_json(pool).await?;
        let _ = self.tx.send(payload);
        Ok(())
    }

    pub async fn snapshot_json(&self, pool: &DbPool) -> anyhow::Result<String> {
        let donations = db::list_donations(pool).await?;
        let today = chrono::Local::now().date_naive();
        let snapshot = DonationsSnapshot {
            impact: impact::summarize(&donations, today),
            donations,
        };
        Ok(serde_json::to_string(&snapshot)?)
    }
}

impl Default for DonationFeed {
    fn default() -> Self {
        Self::new()
    }
}
