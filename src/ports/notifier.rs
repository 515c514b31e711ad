use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OfferNotice {
    pub offer_id: Uuid,
    pub worker_id: Uuid,
    pub task_id: Uuid,
    pub payout_amount: Decimal,
    pub expires_at: DateTime<Utc>,
}

/// Delivers offers to worker devices. Called fire-and-forget: a failure is
/// logged and counted but never blocks or rolls back the dispatch cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_offer(&self, notice: OfferNotice) -> Result<(), AppError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_offer(&self, notice: OfferNotice) -> Result<(), AppError> {
        info!(
            offer_id = %notice.offer_id,
            worker_id = %notice.worker_id,
            task_id = %notice.task_id,
            payout = %notice.payout_amount,
            expires_at = %notice.expires_at,
            "offer notification sent"
        );
        Ok(())
    }
}
