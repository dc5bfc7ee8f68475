pub mod appointment_store;
pub mod bootstrap;
pub mod commands;
pub mod guarded_backend;
pub mod session_guard;

#[cfg(test)]
pub(crate) mod test_support;
