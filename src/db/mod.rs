pub mod accounts;
pub mod audit;
pub mod magic_links;
pub mod profiles;
pub mod refresh_tokens;
pub mod sub_users;
