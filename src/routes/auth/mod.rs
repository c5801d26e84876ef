pub mod claims;
pub mod me;
pub mod session;

pub use me::handle_me;
pub use session::AuthSession;
