pub mod appointment_client;
pub mod appointment_mapper;
pub mod auth_client;
pub mod config;
pub mod error;
pub mod token_store;
