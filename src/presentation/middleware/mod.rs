pub mod auth;

pub use auth::require_export_token;
