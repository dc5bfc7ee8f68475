use crate::application::appointment_store::{AppointmentStore, StoreError, StoreOptions};
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::guarded_backend::{AppointmentBackend, GuardedBackend};
use crate::application::session_guard::{SessionGuard, SessionStatus};
use crate::domain::models::{Appointment, AppointmentChanges, AppointmentDraft, Credentials};
use crate::domain::session::SessionState;
use crate::infrastructure::appointment_client::ReqwestAppointmentClient;
use crate::infrastructure::auth_client::ReqwestAuthClient;
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::error::{AuthError, InfraError};
use crate::infrastructure::token_store::KeyringTokenStore;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const CREATED_MESSAGE: &str = "Appointment created successfully!";
const UPDATED_MESSAGE: &str = "Appointment updated successfully!";
const DELETED_MESSAGE: &str = "Appointment deleted successfully!";
const DELETE_FAILED_MESSAGE: &str = "Failed to delete appointment.";
const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

pub type ProductionSession = SessionGuard<KeyringTokenStore, ReqwestAuthClient>;
pub type ProductionBackend = GuardedBackend<ReqwestAppointmentClient, ProductionSession>;

/// A user action against the appointment set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load,
    Create(AppointmentDraft),
    Update {
        id: i64,
        changes: AppointmentChanges,
    },
    Move {
        id: i64,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    },
    Remove(i64),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Create(_) => "create",
            Self::Update { .. } => "update",
            Self::Move { .. } => "move",
            Self::Remove(_) => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Loaded {
        count: usize,
    },
    Saved {
        appointment: Appointment,
        message: String,
    },
    Removed {
        id: i64,
        message: String,
    },
    Invalid {
        message: String,
    },
    Conflict {
        message: String,
        conflicting_id: Option<i64>,
    },
    Busy {
        id: i64,
        message: String,
    },
    Failed {
        message: String,
    },
    /// The credential was refused. `unsaved` hands the rejected input back
    /// so it can be resubmitted after logging in again.
    SessionExpired {
        message: String,
        unsaved: Option<Command>,
    },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Loaded { .. } | Self::Saved { .. } | Self::Removed { .. }
        )
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Loaded { .. } => None,
            Self::Saved { message, .. }
            | Self::Removed { message, .. }
            | Self::Invalid { message }
            | Self::Conflict { message, .. }
            | Self::Busy { message, .. }
            | Self::Failed { message }
            | Self::SessionExpired { message, .. } => Some(message),
        }
    }
}

pub async fn dispatch<B>(store: &AppointmentStore<B>, command: Command) -> CommandOutcome
where
    B: AppointmentBackend,
{
    let name = command.name();
    debug!(command = name, "dispatching command");

    let result = match &command {
        Command::Load => store
            .load()
            .await
            .map(|count| CommandOutcome::Loaded { count }),
        Command::Create(draft) => store
            .create(draft)
            .await
            .map(|appointment| saved(appointment, CREATED_MESSAGE)),
        Command::Update { id, changes } => store
            .update(*id, changes)
            .await
            .map(|appointment| saved(appointment, UPDATED_MESSAGE)),
        Command::Move {
            id,
            start_at,
            end_at,
        } => store
            .move_appointment(*id, *start_at, *end_at)
            .await
            .map(|appointment| saved(appointment, UPDATED_MESSAGE)),
        Command::Remove(id) => store.remove(*id).await.map(|()| CommandOutcome::Removed {
            id: *id,
            message: DELETED_MESSAGE.to_string(),
        }),
    };

    match result {
        Ok(outcome) => {
            info!(command = name, "command completed");
            outcome
        }
        Err(error) => {
            warn!(command = name, %error, "command failed");
            failure_outcome(command, error)
        }
    }
}

fn saved(appointment: Appointment, message: &str) -> CommandOutcome {
    CommandOutcome::Saved {
        appointment,
        message: message.to_string(),
    }
}

fn failure_outcome(command: Command, error: StoreError) -> CommandOutcome {
    match error {
        StoreError::InvalidInput(message) => CommandOutcome::Invalid { message },
        StoreError::Conflict {
            message,
            conflicting_id,
        } => CommandOutcome::Conflict {
            message,
            conflicting_id,
        },
        StoreError::Unauthorized => CommandOutcome::SessionExpired {
            message: SESSION_EXPIRED_MESSAGE.to_string(),
            unsaved: match command {
                Command::Load => None,
                other => Some(other),
            },
        },
        StoreError::Busy(id) => CommandOutcome::Busy {
            id,
            message: error.to_string(),
        },
        StoreError::MutationFailed(_) if matches!(command, Command::Remove(_)) => {
            CommandOutcome::Failed {
                message: DELETE_FAILED_MESSAGE.to_string(),
            }
        }
        other => CommandOutcome::Failed {
            message: other.to_string(),
        },
    }
}

/// The production wiring: keyring-backed session, HTTP transport and the
/// store on top.
pub struct AppState {
    config_dir: PathBuf,
    config: ClientConfig,
    session: Arc<ProductionSession>,
    store: AppointmentStore<ProductionBackend>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Ok(Self::from_config(bootstrap.config_dir, bootstrap.config))
    }

    pub fn from_config(config_dir: PathBuf, config: ClientConfig) -> Self {
        let token_store = Arc::new(KeyringTokenStore::new(
            config.token_service.clone(),
            config.token_account.clone(),
        ));
        let auth_client = Arc::new(ReqwestAuthClient::new(config.api_base_url.clone()));
        let session = Arc::new(SessionGuard::new(token_store, auth_client));

        let api = Arc::new(ReqwestAppointmentClient::new(config.api_base_url.clone()));
        let backend = Arc::new(GuardedBackend::new(api, Arc::clone(&session)));
        let store = AppointmentStore::with_options(
            backend,
            StoreOptions {
                display_zone: config.display_zone,
                refetch_after_mutation: config.refetch_after_mutation,
            },
        );

        Self {
            config_dir,
            config,
            session,
            store,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &ProductionSession {
        &self.session
    }

    pub fn store(&self) -> &AppointmentStore<ProductionBackend> {
        &self.store
    }

    pub fn session_status(&self) -> watch::Receiver<SessionStatus> {
        self.session.subscribe()
    }

    /// Restores a persisted session and, when it is still valid, loads the
    /// appointment set.
    pub async fn start(&self) -> Result<SessionState, AuthError> {
        let state = self.session.startup()?;
        if state.is_authenticated() {
            self.load_after_auth().await;
        }
        Ok(state)
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<(), AuthError> {
        self.session.login(credentials).await?;
        self.load_after_auth().await;
        Ok(())
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<(), AuthError> {
        self.session.register(credentials).await
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.session.logout()
    }

    pub fn new_draft(&self, now: DateTime<Utc>) -> AppointmentDraft {
        let duration = Duration::try_minutes(self.config.default_duration_minutes)
            .unwrap_or_else(|| Duration::hours(1));
        AppointmentDraft::starting_at(now, duration)
    }

    pub async fn execute(&self, command: Command) -> CommandOutcome {
        dispatch(&self.store, command).await
    }

    pub fn shutdown(&self) {
        self.store.dispose();
    }

    async fn load_after_auth(&self) {
        if let Err(error) = self.store.load().await {
            warn!(%error, "initial appointment load failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{fixed_time, sample_appointment, FakeBackend};
    use crate::application::session_guard::{LogoutReason, SessionAccess};
    use crate::domain::session::encode_test_token;
    use crate::infrastructure::appointment_client::AppointmentApi;
    use crate::infrastructure::auth_client::AuthClient;
    use crate::infrastructure::error::BackendError;
    use crate::infrastructure::token_store::{InMemoryTokenStore, TokenStore};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        root: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let root = std::env::temp_dir().join(format!(
                "appointment-scheduler-commands-{}-{}",
                std::process::id(),
                sequence
            ));
            Self { root }
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn draft(start: &str, end: &str) -> AppointmentDraft {
        AppointmentDraft {
            title: "Dentist".to_string(),
            description: "Check-up".to_string(),
            start_at: fixed_time(start),
            end_at: fixed_time(end),
            is_all_day: false,
            location: Some("Main St".to_string()),
            attendees: None,
        }
    }

    async fn store_with(
        appointments: Vec<Appointment>,
    ) -> (Arc<FakeBackend>, AppointmentStore<FakeBackend>) {
        let backend = Arc::new(FakeBackend::default());
        backend.push_list(Ok(appointments));
        let store = AppointmentStore::with_options(
            Arc::clone(&backend),
            StoreOptions {
                refetch_after_mutation: false,
                ..StoreOptions::default()
            },
        );
        store.load().await.expect("load");
        (backend, store)
    }

    #[tokio::test]
    async fn successful_commands_report_user_messages() {
        let (_backend, store) = store_with(vec![sample_appointment(
            1,
            "2026-02-16T08:00:00Z",
            "2026-02-16T09:00:00Z",
        )])
        .await;

        let created = dispatch(
            &store,
            Command::Create(draft("2026-02-16T10:00:00Z", "2026-02-16T11:00:00Z")),
        )
        .await;
        assert_eq!(created.message(), Some(CREATED_MESSAGE));

        let moved = dispatch(
            &store,
            Command::Move {
                id: 1,
                start_at: fixed_time("2026-02-16T07:00:00Z"),
                end_at: fixed_time("2026-02-16T08:00:00Z"),
            },
        )
        .await;
        assert_eq!(moved.message(), Some(UPDATED_MESSAGE));

        let removed = dispatch(&store, Command::Remove(1)).await;
        assert_eq!(
            removed,
            CommandOutcome::Removed {
                id: 1,
                message: DELETED_MESSAGE.to_string()
            }
        );
        assert!(dispatch(&store, Command::Load).await.is_success());
    }

    #[tokio::test]
    async fn conflicts_and_validation_are_distinct_outcomes() {
        let (backend, store) = store_with(vec![sample_appointment(
            1,
            "2026-02-16T10:00:00Z",
            "2026-02-16T11:00:00Z",
        )])
        .await;

        let local = dispatch(
            &store,
            Command::Create(draft("2026-02-16T10:30:00Z", "2026-02-16T11:30:00Z")),
        )
        .await;
        assert!(matches!(
            local,
            CommandOutcome::Conflict {
                conflicting_id: Some(1),
                ..
            }
        ));

        backend.push_create(Err(BackendError::from_status(409, None)));
        let remote = dispatch(
            &store,
            Command::Create(draft("2026-02-16T12:00:00Z", "2026-02-16T13:00:00Z")),
        )
        .await;
        assert_eq!(
            remote,
            CommandOutcome::Conflict {
                message: "Appointment conflict detected".to_string(),
                conflicting_id: None
            }
        );

        let invalid = dispatch(
            &store,
            Command::Create(draft("2026-02-16T13:00:00Z", "2026-02-16T12:00:00Z")),
        )
        .await;
        assert!(matches!(invalid, CommandOutcome::Invalid { .. }));
    }

    #[tokio::test]
    async fn failed_delete_uses_delete_message() {
        let (backend, store) = store_with(vec![sample_appointment(
            1,
            "2026-02-16T10:00:00Z",
            "2026-02-16T11:00:00Z",
        )])
        .await;
        backend.push_delete(Err(BackendError::Other("http 500".to_string())));

        let outcome = dispatch(&store, Command::Remove(1)).await;
        assert_eq!(
            outcome,
            CommandOutcome::Failed {
                message: DELETE_FAILED_MESSAGE.to_string()
            }
        );
    }

    #[tokio::test]
    async fn session_expiry_returns_unsaved_input() {
        let (backend, store) = store_with(Vec::new()).await;
        backend.push_create(Err(BackendError::Unauthorized));
        let command = Command::Create(draft("2026-02-16T10:00:00Z", "2026-02-16T11:00:00Z"));

        let outcome = dispatch(&store, command.clone()).await;
        assert_eq!(
            outcome,
            CommandOutcome::SessionExpired {
                message: SESSION_EXPIRED_MESSAGE.to_string(),
                unsaved: Some(command)
            }
        );

        backend.push_list(Err(BackendError::Unauthorized));
        assert!(matches!(
            dispatch(&store, Command::Load).await,
            CommandOutcome::SessionExpired { unsaved: None, .. }
        ));
    }

    #[test]
    fn app_state_wires_configured_defaults() {
        let workspace = TempWorkspace::new();
        let state = AppState::new(workspace.root.clone()).expect("app state");

        assert!(state.config_dir().join("app.json").exists());
        assert!(!state.session().is_authenticated());
        assert!(state.store().snapshot().is_empty());

        let draft = state.new_draft(fixed_time("2026-02-16T10:17:42Z"));
        assert_eq!(draft.start_at, fixed_time("2026-02-16T10:17:00Z"));
        assert_eq!(
            draft.end_at - draft.start_at,
            Duration::minutes(state.config().default_duration_minutes)
        );
    }

    #[tokio::test]
    async fn commands_without_session_never_reach_network() {
        let workspace = TempWorkspace::new();
        let state = AppState::new(workspace.root.clone()).expect("app state");

        let outcome = state.execute(Command::Load).await;
        assert!(matches!(outcome, CommandOutcome::SessionExpired { .. }));

        state.shutdown();
        assert!(matches!(
            state.execute(Command::Remove(1)).await,
            CommandOutcome::Failed { .. }
        ));
    }

    struct UnusedAuthClient;

    #[async_trait]
    impl AuthClient for UnusedAuthClient {
        async fn login(&self, _credentials: &Credentials) -> Result<String, AuthError> {
            Err(AuthError::Transport("not expected in this test".to_string()))
        }

        async fn register(&self, _credentials: &Credentials) -> Result<(), AuthError> {
            Err(AuthError::Transport("not expected in this test".to_string()))
        }
    }

    /// Lists one appointment and refuses every change with 401.
    struct RevokedApi {
        existing: Appointment,
        seen_tokens: AtomicUsize,
    }

    #[async_trait]
    impl AppointmentApi for RevokedApi {
        async fn list(&self, _access_token: &str) -> Result<Vec<Appointment>, BackendError> {
            self.seen_tokens.fetch_add(1, Ordering::SeqCst);
            Ok(vec![self.existing.clone()])
        }

        async fn create(
            &self,
            _access_token: &str,
            _appointment: &Appointment,
        ) -> Result<Appointment, BackendError> {
            self.seen_tokens.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::from_status(401, None))
        }

        async fn update(
            &self,
            _access_token: &str,
            _id: i64,
            _appointment: &Appointment,
        ) -> Result<Appointment, BackendError> {
            self.seen_tokens.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::from_status(401, None))
        }

        async fn delete(&self, _access_token: &str, _id: i64) -> Result<(), BackendError> {
            self.seen_tokens.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::from_status(401, None))
        }
    }

    #[tokio::test]
    async fn rejected_change_logs_out_and_clears_stored_token() {
        let now = fixed_time("2026-02-16T09:00:00Z");
        let existing = sample_appointment(1, "2026-02-16T10:00:00Z", "2026-02-16T11:00:00Z");
        let commands = vec![
            Command::Create(draft("2026-02-16T12:00:00Z", "2026-02-16T13:00:00Z")),
            Command::Update {
                id: 1,
                changes: AppointmentChanges {
                    title: Some("Renamed".to_string()),
                    ..AppointmentChanges::default()
                },
            },
            Command::Move {
                id: 1,
                start_at: fixed_time("2026-02-16T14:00:00Z"),
                end_at: fixed_time("2026-02-16T15:00:00Z"),
            },
            Command::Remove(1),
        ];

        for command in commands {
            let token_store = Arc::new(InMemoryTokenStore::with_token(encode_test_token(
                now + Duration::hours(1),
            )));
            let session = Arc::new(
                SessionGuard::new(Arc::clone(&token_store), Arc::new(UnusedAuthClient))
                    .with_now_provider(Arc::new(move || now)),
            );
            let api = Arc::new(RevokedApi {
                existing: existing.clone(),
                seen_tokens: AtomicUsize::new(0),
            });
            let store = AppointmentStore::with_options(
                Arc::new(GuardedBackend::new(Arc::clone(&api), Arc::clone(&session))),
                StoreOptions {
                    refetch_after_mutation: false,
                    ..StoreOptions::default()
                },
            );
            session.startup().expect("startup");
            store.load().await.expect("load");

            let outcome = dispatch(&store, command.clone()).await;

            assert_eq!(
                outcome,
                CommandOutcome::SessionExpired {
                    message: SESSION_EXPIRED_MESSAGE.to_string(),
                    unsaved: Some(command)
                }
            );
            assert!(!session.is_authenticated());
            assert_eq!(session.access_token(), None);
            assert_eq!(token_store.load_token().expect("load token"), None);
            assert_eq!(
                *session.subscribe().borrow(),
                SessionStatus::Unauthenticated {
                    reason: Some(LogoutReason::Rejected)
                }
            );
            assert_eq!(store.get(1), Some(existing.clone()));

            // later calls stop at the guard
            assert_eq!(store.load().await, Err(StoreError::Unauthorized));
            assert_eq!(api.seen_tokens.load(Ordering::SeqCst), 2);
        }
    }
}
