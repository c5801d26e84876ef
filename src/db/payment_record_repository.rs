use async_trait::async_trait;
use uuid::Uuid;

use crate::models::payment_record::{
    GatewayMetadata, NewPaymentRecord, PaymentRecord, PaymentStatus,
};

#[async_trait]
pub trait PaymentRecordRepository: Send + Sync {
    async fn insert(&self, record: &NewPaymentRecord) -> Result<PaymentRecord, sqlx::Error>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, sqlx::Error>;
    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;
    /// Matches the settled payment id column or the payment intent echoed in
    /// the gateway metadata.
    async fn find_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;
    /// Moves the record to `next` when the current status allows it, merging
    /// metadata and filling the payment id if unset. Returns `None` when the
    /// transition is refused or the record does not exist.
    async fn transition_status(
        &self,
        id: Uuid,
        next: PaymentStatus,
        metadata: &GatewayMetadata,
        payment_id: Option<&str>,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;
    /// Merges metadata without touching the status.
    async fn update_gateway_metadata(
        &self,
        id: Uuid,
        metadata: &GatewayMetadata,
        payment_id: Option<&str>,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;
    /// Atomically flips `processed` from false to true on a succeeded record.
    /// Returns true only for the caller that performed the flip.
    async fn mark_processed(&self, id: Uuid) -> Result<bool, sqlx::Error>;
}

/// Statuses a record may currently hold for a move to `next` to apply.
/// Re-applying the current status is accepted so retried events stay harmless.
pub fn transition_sources(next: PaymentStatus) -> Vec<PaymentStatus> {
    [
        PaymentStatus::Pending,
        PaymentStatus::Succeeded,
        PaymentStatus::Failed,
        PaymentStatus::Expired,
    ]
    .into_iter()
    .filter(|current| *current == next || current.can_transition_to(next))
    .collect()
}
