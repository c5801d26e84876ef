use async_trait::async_trait;
use sqlx::error::{BoxDynError, DatabaseError, ErrorKind};
use sqlx::types::Json;
use std::borrow::Cow;
use std::error::Error;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use super::inventory_repository::InventoryRepository;
use super::payment_record_repository::{transition_sources, PaymentRecordRepository};
use super::user_repository::UserRepository;
use crate::models::inventory::{InventoryItem, InventorySearchQuery};
use crate::models::membership::{MembershipStatus, MembershipTier};
use crate::models::payment_record::{
    GatewayMetadata, NewPaymentRecord, PaymentRecord, PaymentStatus,
};
use crate::models::user::{AccountOrigin, MembershipGrant, NewUser, User};

fn mock_failure() -> sqlx::Error {
    sqlx::Error::Protocol("Mock DB failure".into())
}

/// What Postgres reports when `users_email_key` rejects a second account.
#[derive(Debug)]
struct DuplicateEmail;

impl std::fmt::Display for DuplicateEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "duplicate key value violates unique constraint \"users_email_key\"")
    }
}

impl Error for DuplicateEmail {}

impl DatabaseError for DuplicateEmail {
    fn message(&self) -> &str {
        "duplicate key value violates unique constraint"
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed("23505"))
    }

    fn constraint(&self) -> Option<&str> {
        Some("users_email_key")
    }

    fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> BoxDynError {
        self
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::UniqueViolation
    }
}

pub fn sample_user(email: &str, origin: AccountOrigin, tier: MembershipTier) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id: Uuid::new_v4(),
        email: email.to_lowercase(),
        password_hash: match origin {
            AccountOrigin::Credentials => Some("$argon2id$stub".into()),
            AccountOrigin::Oauth => None,
        },
        account_origin: origin,
        first_name: "Sample".into(),
        last_name: "Member".into(),
        membership: tier,
        membership_status: MembershipStatus::Active,
        membership_started_at: None,
        membership_paid_amount: None,
        membership_payment_ref: None,
        external_customer_id: None,
        receive_updates: false,
        created_at: now,
        updated_at: now,
    }
}

/// In-memory user store with the same unique-email rule as the table.
#[derive(Default)]
pub struct MockUserRepository {
    pub users: Mutex<Vec<User>>,
    pub should_fail: bool,
    /// Fails every membership write, leaving inserts untouched.
    pub fail_grants: Mutex<bool>,
}

impl MockUserRepository {
    pub fn with_user(user: User) -> Self {
        Self {
            users: Mutex::new(vec![user]),
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> Vec<User> {
        self.users.lock().unwrap().clone()
    }

    fn insert(&self, user: &NewUser, grant: Option<&MembershipGrant>) -> Result<User, sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(sqlx::Error::Database(Box::new(DuplicateEmail)));
        }

        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email.to_lowercase(),
            password_hash: user.password_hash.clone(),
            account_origin: user.account_origin,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            membership: grant.map_or(MembershipTier::Free, |g| g.tier),
            membership_status: MembershipStatus::Active,
            membership_started_at: grant.map(|g| g.granted_at),
            membership_paid_amount: grant.map(|g| g.paid_amount),
            membership_payment_ref: grant.and_then(|g| g.payment_ref.clone()),
            external_customer_id: grant.and_then(|g| g.external_customer_id.clone()),
            receive_updates: user.receive_updates,
            created_at: now,
            updated_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        self.insert(user, None)
    }

    async fn create_member(
        &self,
        user: &NewUser,
        grant: &MembershipGrant,
    ) -> Result<User, sqlx::Error> {
        if self.should_fail || *self.fail_grants.lock().unwrap() {
            return Err(mock_failure());
        }
        self.insert(user, Some(grant))
    }

    async fn apply_membership(
        &self,
        user_id: Uuid,
        grant: &MembershipGrant,
    ) -> Result<Option<User>, sqlx::Error> {
        if self.should_fail || *self.fail_grants.lock().unwrap() {
            return Err(mock_failure());
        }

        let mut users = self.users.lock().unwrap();
        let Some(user) = users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(None);
        };

        let same_grant = user.membership == grant.tier
            && user.membership_payment_ref == grant.payment_ref
            && user.membership_started_at.is_some();
        if !same_grant {
            user.membership_started_at = Some(grant.granted_at);
        }
        user.membership = grant.tier;
        user.membership_status = MembershipStatus::Active;
        user.membership_paid_amount = Some(grant.paid_amount);
        user.membership_payment_ref = grant.payment_ref.clone();
        if grant.external_customer_id.is_some() {
            user.external_customer_id = grant.external_customer_id.clone();
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }
}

/// In-memory payment record store. `mark_processed` holds the lock across
/// the check and the flip, mirroring the conditional update in Postgres.
#[derive(Default)]
pub struct MockPaymentRecordRepository {
    pub records: Mutex<Vec<PaymentRecord>>,
    pub should_fail: bool,
}

impl MockPaymentRecordRepository {
    pub fn get(&self, id: Uuid) -> Option<PaymentRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn push(&self, record: PaymentRecord) {
        self.records.lock().unwrap().push(record);
    }

    fn update<F>(&self, id: Uuid, apply: F) -> Option<PaymentRecord>
    where
        F: FnOnce(&mut PaymentRecord) -> bool,
    {
        let mut records = self.records.lock().unwrap();
        let record = records.iter_mut().find(|r| r.id == id)?;
        if apply(record) {
            record.updated_at = OffsetDateTime::now_utc();
            Some(record.clone())
        } else {
            None
        }
    }
}

fn merge_into(record: &mut PaymentRecord, metadata: &GatewayMetadata, payment_id: Option<&str>) {
    record.gateway_metadata.0.merge(metadata.clone());
    if record.external_payment_id.is_none() {
        record.external_payment_id = payment_id.map(str::to_string);
    }
}

#[async_trait]
impl PaymentRecordRepository for MockPaymentRecordRepository {
    async fn insert(&self, record: &NewPaymentRecord) -> Result<PaymentRecord, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        let mut records = self.records.lock().unwrap();
        if records
            .iter()
            .any(|r| r.external_session_id == record.external_session_id)
        {
            return Err(sqlx::Error::Protocol("duplicate session id".into()));
        }
        let now = OffsetDateTime::now_utc();
        let stored = PaymentRecord {
            id: record.id,
            external_session_id: record.external_session_id.clone(),
            external_payment_id: None,
            customer_email: record.customer_email.to_lowercase(),
            pending_user_payload: Json(record.pending_user_payload.clone()),
            membership_tier: record.membership_tier,
            amount_minor_units: record.amount_minor_units,
            currency: record.currency.clone(),
            status: PaymentStatus::Pending,
            processed: false,
            gateway_metadata: Json(GatewayMetadata::default()),
            created_at: now,
            updated_at: now,
            expires_at: record.expires_at,
        };
        records.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        Ok(self.get(id))
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.external_session_id == session_id)
            .cloned())
    }

    async fn find_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| {
                r.external_payment_id.as_deref() == Some(payment_id)
                    || r.gateway_metadata.0.payment_intent.as_deref() == Some(payment_id)
            })
            .cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        next: PaymentStatus,
        metadata: &GatewayMetadata,
        payment_id: Option<&str>,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        let sources = transition_sources(next);
        Ok(self.update(id, |record| {
            if !sources.contains(&record.status) {
                return false;
            }
            record.status = next;
            merge_into(record, metadata, payment_id);
            true
        }))
    }

    async fn update_gateway_metadata(
        &self,
        id: Uuid,
        metadata: &GatewayMetadata,
        payment_id: Option<&str>,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        Ok(self.update(id, |record| {
            merge_into(record, metadata, payment_id);
            true
        }))
    }

    async fn mark_processed(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        Ok(self
            .update(id, |record| {
                if record.processed || record.status != PaymentStatus::Succeeded {
                    return false;
                }
                record.processed = true;
                true
            })
            .is_some())
    }
}

#[derive(Default)]
pub struct MockInventoryRepository {
    pub items: Vec<InventoryItem>,
    pub search_calls: Mutex<usize>,
}

#[async_trait]
impl InventoryRepository for MockInventoryRepository {
    async fn list_featured(&self, limit: i64) -> Result<Vec<InventoryItem>, sqlx::Error> {
        Ok(self
            .items
            .iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn search(
        &self,
        query: &InventorySearchQuery,
    ) -> Result<Vec<InventoryItem>, sqlx::Error> {
        *self.search_calls.lock().unwrap() += 1;
        Ok(self
            .items
            .iter()
            .filter(|item| query.matches(item))
            .take(query.effective_limit() as usize)
            .cloned()
            .collect())
    }
}
