pub mod inventory;
pub mod membership;
pub mod payment_record;
pub mod user;
