pub mod account;
pub mod audit_event;
pub mod magic_link_token;
pub mod profile;
pub mod refresh_token;
pub mod sub_user;

pub use account::Account;
pub use audit_event::AuditEvent;
pub use magic_link_token::MagicLinkToken;
pub use profile::Profile;
pub use refresh_token::RefreshToken;
pub use sub_user::SubUser;
