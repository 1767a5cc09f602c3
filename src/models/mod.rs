pub mod company;
pub mod deviation;
pub mod document;
pub mod health;
pub mod identity;
pub mod password_reset;
pub mod session;
pub mod user;
