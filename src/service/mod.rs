pub mod blob;
pub mod company;
pub mod deviation;
pub mod document;
pub mod email;
pub mod identity;
pub mod service_util;
pub mod session;
