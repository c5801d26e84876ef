pub mod inventory_repository;
#[cfg(test)]
pub mod mock_db;
pub mod payment_record_repository;
pub mod postgres_inventory_repository;
pub mod postgres_payment_record_repository;
pub mod postgres_user_repository;
pub mod user_repository;
