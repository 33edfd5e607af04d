//! Request handlers.

pub mod login;

pub use login::{health, login, login_config};
