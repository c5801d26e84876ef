use crate::config::Config;
use crate::db::{
    inventory_repository::InventoryRepository, payment_record_repository::PaymentRecordRepository,
    user_repository::UserRepository,
};
use crate::services::smtp_mailer::Mailer;
use crate::services::stripe::StripeService;
use crate::utils::jwt::SessionTokens;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn UserRepository>,
    pub payments: Arc<dyn PaymentRecordRepository>,
    pub inventory: Arc<dyn InventoryRepository>,
    pub mailer: Arc<dyn Mailer>,
    pub stripe: Arc<dyn StripeService>,
    pub config: Arc<Config>,
    pub tokens: Arc<SessionTokens>,
}

/// Handles on the in-memory collaborators behind a test `AppState`.
#[cfg(test)]
pub(crate) struct TestState {
    pub state: AppState,
    pub users: Arc<crate::db::mock_db::MockUserRepository>,
    pub payments: Arc<crate::db::mock_db::MockPaymentRecordRepository>,
    pub inventory: Arc<crate::db::mock_db::MockInventoryRepository>,
    pub mailer: Arc<crate::services::smtp_mailer::MockMailer>,
    pub stripe: crate::services::stripe::MockStripeService,
}

#[cfg(test)]
pub(crate) fn test_state() -> TestState {
    test_state_from(Default::default(), Default::default(), Default::default())
}

#[cfg(test)]
pub(crate) fn test_state_from(
    users: crate::db::mock_db::MockUserRepository,
    inventory: crate::db::mock_db::MockInventoryRepository,
    mailer: crate::services::smtp_mailer::MockMailer,
) -> TestState {
    let users = Arc::new(users);
    let payments = Arc::new(crate::db::mock_db::MockPaymentRecordRepository::default());
    let inventory = Arc::new(inventory);
    let mailer = Arc::new(mailer);
    let stripe = crate::services::stripe::MockStripeService::new();

    let state = AppState {
        db: users.clone(),
        payments: payments.clone(),
        inventory: inventory.clone(),
        mailer: mailer.clone(),
        stripe: Arc::new(stripe.clone()),
        config: Arc::new(crate::config::test_config()),
        tokens: Arc::new(crate::utils::jwt::test_session_tokens()),
    };

    TestState {
        state,
        users,
        payments,
        inventory,
        mailer,
        stripe,
    }
}
