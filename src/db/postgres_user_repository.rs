use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::user_repository::UserRepository,
    models::user::{MembershipGrant, NewUser, User},
};

const USER_COLUMNS: &str = r#"
    id,
    email,
    password_hash,
    account_origin,
    first_name,
    last_name,
    membership,
    membership_status,
    membership_started_at,
    membership_paid_amount,
    membership_payment_ref,
    external_customer_id,
    receive_updates,
    created_at,
    updated_at
"#;

pub struct PostgresUserRepository {
    pub pool: PgPool,
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = lower($1)");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO users (
                email,
                password_hash,
                account_origin,
                first_name,
                last_name,
                receive_updates
            )
            VALUES (lower($1), $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(user.password_hash.as_deref())
            .bind(user.account_origin)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.receive_updates)
            .fetch_one(&self.pool)
            .await
    }

    async fn create_member(
        &self,
        user: &NewUser,
        grant: &MembershipGrant,
    ) -> Result<User, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO users (
                email,
                password_hash,
                account_origin,
                first_name,
                last_name,
                receive_updates,
                membership,
                membership_status,
                membership_started_at,
                membership_paid_amount,
                membership_payment_ref,
                external_customer_id
            )
            VALUES (lower($1), $2, $3, $4, $5, $6, $7, 'active', $8, $9, $10, $11)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(user.password_hash.as_deref())
            .bind(user.account_origin)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.receive_updates)
            .bind(grant.tier)
            .bind(grant.granted_at)
            .bind(grant.paid_amount)
            .bind(grant.payment_ref.as_deref())
            .bind(grant.external_customer_id.as_deref())
            .fetch_one(&self.pool)
            .await
    }

    async fn apply_membership(
        &self,
        user_id: Uuid,
        grant: &MembershipGrant,
    ) -> Result<Option<User>, sqlx::Error> {
        // SET expressions see the pre-update row.
        let sql = format!(
            r#"
            UPDATE users
            SET membership = $2,
                membership_status = 'active',
                membership_started_at = CASE
                    WHEN membership = $2
                         AND membership_payment_ref IS NOT DISTINCT FROM $4
                         AND membership_started_at IS NOT NULL
                    THEN membership_started_at
                    ELSE $6
                END,
                membership_paid_amount = $3,
                membership_payment_ref = $4,
                external_customer_id = COALESCE($5, external_customer_id),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(grant.tier)
            .bind(grant.paid_amount)
            .bind(grant.payment_ref.as_deref())
            .bind(grant.external_customer_id.as_deref())
            .bind(grant.granted_at)
            .fetch_optional(&self.pool)
            .await
    }
}
