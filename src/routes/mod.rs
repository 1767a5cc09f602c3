pub mod company;
pub mod deviation;
pub mod document;
pub mod error;
pub mod files;
pub mod health;
pub mod session;
