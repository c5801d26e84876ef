pub mod membership;
pub mod smtp_mailer;
pub mod stripe;
