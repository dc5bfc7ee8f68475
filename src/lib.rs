pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::appointment_store::{
    AppointmentStore, AppointmentView, StoreError, StoreOptions,
};
pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::commands::{dispatch, AppState, Command, CommandOutcome};
pub use application::guarded_backend::{AppointmentBackend, GuardedBackend};
pub use application::session_guard::{LogoutReason, SessionAccess, SessionGuard, SessionStatus};
pub use domain::conflict::{detect_conflict, ConflictOutcome};
pub use domain::models::{Appointment, AppointmentChanges, AppointmentDraft, Credentials};
pub use domain::session::{SessionState, SessionToken};
pub use domain::time::{DisplayZone, TimeError};
