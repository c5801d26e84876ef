use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::{
    db::payment_record_repository::{transition_sources, PaymentRecordRepository},
    models::payment_record::{GatewayMetadata, NewPaymentRecord, PaymentRecord, PaymentStatus},
};

const PAYMENT_RECORD_COLUMNS: &str = r#"
    id,
    external_session_id,
    external_payment_id,
    customer_email,
    pending_user_payload,
    membership_tier,
    amount_minor_units,
    currency,
    status,
    processed,
    gateway_metadata,
    created_at,
    updated_at,
    expires_at
"#;

pub struct PostgresPaymentRecordRepository {
    pub pool: PgPool,
}

#[async_trait]
impl PaymentRecordRepository for PostgresPaymentRecordRepository {
    async fn insert(&self, record: &NewPaymentRecord) -> Result<PaymentRecord, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO payment_records (
                id,
                external_session_id,
                customer_email,
                pending_user_payload,
                membership_tier,
                amount_minor_units,
                currency,
                expires_at
            )
            VALUES ($1, $2, lower($3), $4, $5, $6, $7, $8)
            RETURNING {PAYMENT_RECORD_COLUMNS}
            "#
        );
        sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(record.id)
            .bind(&record.external_session_id)
            .bind(&record.customer_email)
            .bind(Json(&record.pending_user_payload))
            .bind(record.membership_tier)
            .bind(record.amount_minor_units)
            .bind(&record.currency)
            .bind(record.expires_at)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, sqlx::Error> {
        let sql = format!("SELECT {PAYMENT_RECORD_COLUMNS} FROM payment_records WHERE id = $1");
        sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {PAYMENT_RECORD_COLUMNS} FROM payment_records WHERE external_session_id = $1"
        );
        sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {PAYMENT_RECORD_COLUMNS}
            FROM payment_records
            WHERE external_payment_id = $1
               OR gateway_metadata ->> 'paymentIntent' = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );
        sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn transition_status(
        &self,
        id: Uuid,
        next: PaymentStatus,
        metadata: &GatewayMetadata,
        payment_id: Option<&str>,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        let sources: Vec<String> = transition_sources(next)
            .into_iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let sql = format!(
            r#"
            UPDATE payment_records
            SET status = $2,
                gateway_metadata = gateway_metadata || $3,
                external_payment_id = COALESCE(external_payment_id, $4),
                updated_at = now()
            WHERE id = $1
              AND status::text = ANY($5)
            RETURNING {PAYMENT_RECORD_COLUMNS}
            "#
        );
        sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(id)
            .bind(next)
            .bind(Json(metadata))
            .bind(payment_id)
            .bind(&sources)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_gateway_metadata(
        &self,
        id: Uuid,
        metadata: &GatewayMetadata,
        payment_id: Option<&str>,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE payment_records
            SET gateway_metadata = gateway_metadata || $2,
                external_payment_id = COALESCE(external_payment_id, $3),
                updated_at = now()
            WHERE id = $1
            RETURNING {PAYMENT_RECORD_COLUMNS}
            "#
        );
        sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(id)
            .bind(Json(metadata))
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn mark_processed(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let flipped = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE payment_records
            SET processed = true,
                updated_at = now()
            WHERE id = $1
              AND processed = false
              AND status = 'succeeded'
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(flipped.is_some())
    }
}
