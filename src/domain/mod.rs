pub mod conflict;
pub mod models;
pub mod session;
pub mod time;
