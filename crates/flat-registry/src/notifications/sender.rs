use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::records::{Email, Flat, FlatId, HouseId};

/// Message delivered to a house subscriber when a flat is listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatNotice {
    pub house_id: HouseId,
    pub flat_id: FlatId,
    pub flat_number: u32,
    pub rooms: u32,
    pub price: u64,
}

impl FlatNotice {
    pub fn subject(&self) -> String {
        format!("New flat listed in house {}", self.house_id)
    }

    pub fn body(&self) -> String {
        format!(
            "Flat #{} ({} rooms, price {}) is now listed in house {}.",
            self.flat_number, self.rooms, self.price, self.house_id
        )
    }
}

impl From<&Flat> for FlatNotice {
    fn from(flat: &Flat) -> Self {
        Self {
            house_id: flat.house_id,
            flat_id: flat.id,
            flat_number: flat.flat_number,
            rooms: flat.rooms,
            price: flat.price,
        }
    }
}

/// Outbound single-recipient delivery (e-mail or similar adapters).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &Email, notice: &FlatNotice) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("recipient {0} rejected the message")]
    Rejected(String),
}

/// Notifier that records each delivery in the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    latency: Duration,
}

impl LogNotifier {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &Email, notice: &FlatNotice) -> Result<(), NotifyError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        info!(
            recipient = %recipient,
            house_id = %notice.house_id,
            flat_id = %notice.flat_id,
            subject = %notice.subject(),
            "notification delivered"
        );
        Ok(())
    }
}
