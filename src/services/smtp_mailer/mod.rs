use async_trait::async_trait;
use lettre::address::AddressError;

use crate::models::membership::MembershipTier;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Error: {0}")]
    Other(String),
    #[error("Invalid Address: {0}")]
    InvalidEmailAddress(String),
    #[error("Send error: {0}")]
    SendError(String),
    #[error("Env Var Missing: {0}")]
    EnvVarMissing(String),
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        MailError::SendError(err.to_string())
    }
}

impl From<std::env::VarError> for MailError {
    fn from(err: std::env::VarError) -> Self {
        MailError::EnvVarMissing(err.to_string())
    }
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        MailError::SendError(err.to_string())
    }
}

impl From<AddressError> for MailError {
    fn from(e: AddressError) -> Self {
        MailError::InvalidEmailAddress(e.to_string())
    }
}

/// Details for the one confirmation sent when a membership is activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipConfirmation {
    pub to: String,
    pub first_name: String,
    pub tier: MembershipTier,
    pub amount_minor_units: i64,
    pub currency: String,
}

impl MembershipConfirmation {
    pub fn subject(&self) -> String {
        format!("Welcome to {} Membership", self.tier.display_name())
    }

    pub fn body(&self) -> String {
        let greeting = if self.first_name.trim().is_empty() {
            "Hello,".to_string()
        } else {
            format!("Hello {},", self.first_name.trim())
        };
        format!(
            "{}\n\nYour {} membership is now active.\n\nAmount paid: {}\n\nYour concierge team is ready whenever you are.",
            greeting,
            self.tier.display_name(),
            format_amount(self.amount_minor_units, &self.currency),
        )
    }
}

pub fn format_amount(minor_units: i64, currency: &str) -> String {
    format!(
        "{}.{:02} {}",
        minor_units / 100,
        (minor_units % 100).abs(),
        currency.to_uppercase()
    )
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email_generic(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), MailError>;

    async fn send_membership_confirmation(
        &self,
        confirmation: &MembershipConfirmation,
    ) -> Result<(), MailError> {
        self.send_email_generic(
            &confirmation.to,
            &confirmation.subject(),
            &confirmation.body(),
        )
        .await
    }
}

#[cfg(test)]
mod mock_mailer;
mod smtp_impl;

#[cfg(test)]
pub use mock_mailer::MockMailer;
pub use smtp_impl::SmtpMailer;
