use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl OfferStatus {
    /// Offers only ever leave `Pending`; every resolution is final.
    pub fn can_transition_to(self, target: OfferStatus) -> bool {
        self == OfferStatus::Pending && target != OfferStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    TooFar,
    Busy,
    LowPayout,
    VehicleIssue,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOffer {
    pub id: Uuid,
    pub task_id: Uuid,
    pub worker_id: Uuid,
    pub status: OfferStatus,
    pub offered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub payout_amount: Decimal,
    pub decline_reason: Option<DeclineReason>,
}

impl TaskOffer {
    /// Expiry is a recorded state: a resolved offer is never "expired" by the clock.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Pending && now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{OfferStatus, TaskOffer};

    fn offer(status: OfferStatus, expires_in: Duration) -> TaskOffer {
        let now = Utc::now();
        TaskOffer {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            worker_id: Uuid::new_v4(),
            status,
            offered_at: now,
            expires_at: now + expires_in,
            responded_at: None,
            payout_amount: Decimal::from(900),
            decline_reason: None,
        }
    }

    #[test]
    fn pending_offer_past_deadline_is_expired() {
        let o = offer(OfferStatus::Pending, Duration::seconds(-1));
        assert!(o.is_expired(Utc::now()));
    }

    #[test]
    fn resolved_offer_is_never_expired_by_the_clock() {
        let accepted = offer(OfferStatus::Accepted, Duration::seconds(-60));
        assert!(!accepted.is_expired(Utc::now()));

        let rejected = offer(OfferStatus::Rejected, Duration::seconds(-60));
        assert!(!rejected.is_expired(Utc::now()));
    }

    #[test]
    fn resolution_is_one_way() {
        assert!(OfferStatus::Pending.can_transition_to(OfferStatus::Expired));
        assert!(!OfferStatus::Expired.can_transition_to(OfferStatus::Accepted));
        assert!(!OfferStatus::Accepted.can_transition_to(OfferStatus::Rejected));
        assert!(!OfferStatus::Pending.can_transition_to(OfferStatus::Pending));
    }
}
