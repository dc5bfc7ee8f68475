use crate::application::guarded_backend::AppointmentBackend;
use crate::domain::conflict::{detect_conflict, ConflictOutcome};
use crate::domain::models::{Appointment, AppointmentChanges, AppointmentDraft};
use crate::domain::time::DisplayZone;
use crate::infrastructure::error::BackendError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{message}")]
    Conflict {
        message: String,
        conflicting_id: Option<i64>,
    },
    #[error("session is no longer authorized")]
    Unauthorized,
    #[error("failed to load appointments: {0}")]
    LoadFailed(String),
    #[error("appointment change failed: {0}")]
    MutationFailed(String),
    #[error("appointment {0} already has a change in flight")]
    Busy(i64),
    #[error("appointment store has been disposed")]
    Disposed,
}

impl StoreError {
    fn from_mutation(error: BackendError) -> Self {
        match error {
            BackendError::Conflict { message } => Self::Conflict {
                message,
                conflicting_id: None,
            },
            BackendError::Unauthorized => Self::Unauthorized,
            BackendError::Other(message) => Self::MutationFailed(message),
        }
    }

    fn from_load(error: BackendError) -> Self {
        match error {
            BackendError::Unauthorized => Self::Unauthorized,
            other => Self::LoadFailed(other.to_string()),
        }
    }
}

/// Display-local projection of an appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentView {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub all_day: bool,
    pub location: Option<String>,
    pub attendees: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub display_zone: DisplayZone,
    pub refetch_after_mutation: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            display_zone: DisplayZone::default(),
            refetch_after_mutation: true,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    appointments: HashMap<i64, Appointment>,
    pending: HashSet<i64>,
    // moves applied locally but not yet confirmed
    optimistic: HashMap<i64, Appointment>,
    generation: u64,
    loads_in_flight: usize,
    // confirmed changes a running load may have missed; `None` is a delete
    confirmed: Vec<(u64, i64, Option<Appointment>)>,
}

impl StoreState {
    fn confirm(&mut self, id: i64, record: Option<Appointment>) {
        self.generation += 1;
        match &record {
            Some(appointment) => {
                self.appointments.insert(id, appointment.clone());
            }
            None => {
                self.appointments.remove(&id);
            }
        }
        if self.loads_in_flight > 0 {
            self.confirmed.push((self.generation, id, record));
        }
    }

    fn replay_confirmed_since(&mut self, generation: u64) {
        let missed: Vec<(i64, Option<Appointment>)> = self
            .confirmed
            .iter()
            .filter(|(confirmed_at, _, _)| *confirmed_at > generation)
            .map(|(_, id, record)| (*id, record.clone()))
            .collect();
        for (id, record) in missed {
            match record {
                Some(appointment) => {
                    self.appointments.insert(id, appointment);
                }
                None => {
                    self.appointments.remove(&id);
                }
            }
        }
    }
}

struct LoadTicket<'a> {
    state: &'a Mutex<StoreState>,
    started_at: u64,
}

impl Drop for LoadTicket<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.loads_in_flight = state.loads_in_flight.saturating_sub(1);
        if state.loads_in_flight == 0 {
            state.confirmed.clear();
        }
    }
}

struct PendingGuard<'a> {
    state: &'a Mutex<StoreState>,
    id: i64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.remove(&self.id);
        state.optimistic.remove(&self.id);
    }
}

pub struct AppointmentStore<B>
where
    B: AppointmentBackend,
{
    backend: Arc<B>,
    options: StoreOptions,
    state: Mutex<StoreState>,
    disposed: AtomicBool,
}

impl<B> AppointmentStore<B>
where
    B: AppointmentBackend,
{
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_options(backend, StoreOptions::default())
    }

    pub fn with_options(backend: Arc<B>, options: StoreOptions) -> Self {
        Self {
            backend,
            options,
            state: Mutex::new(StoreState::default()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn display_zone(&self) -> &DisplayZone {
        &self.options.display_zone
    }

    /// Tears the store down: responses still in flight are dropped without
    /// touching state and every later call fails with `Disposed`.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub async fn load(&self) -> Result<usize, StoreError> {
        self.ensure_open()?;
        debug!("loading appointments");
        let ticket = self.begin_load();
        let result = self.backend.list().await;
        self.ensure_open()?;

        let appointments = result.map_err(|error| {
            warn!(%error, "appointment load failed; keeping previous state");
            StoreError::from_load(error)
        })?;

        let mut state = self.lock_state();
        state.appointments = appointments
            .into_iter()
            .map(|appointment| (appointment.id, appointment))
            .collect();
        // changes confirmed while the list was in flight are newer than it
        state.replay_confirmed_since(ticket.started_at);
        let optimistic: Vec<Appointment> = state.optimistic.values().cloned().collect();
        for appointment in optimistic {
            if let Some(current) = state.appointments.get_mut(&appointment.id) {
                *current = appointment;
            }
        }
        let count = state.appointments.len();
        drop(state);
        drop(ticket);
        info!(count, "appointments loaded");
        Ok(count)
    }

    pub async fn create(&self, draft: &AppointmentDraft) -> Result<Appointment, StoreError> {
        self.ensure_open()?;
        let candidate = draft.clone().into_appointment();
        self.check_candidate(&candidate, None)?;

        debug!(title = %candidate.title, "submitting new appointment");
        let result = self.backend.create(&candidate).await;
        self.ensure_open()?;

        let created = result.map_err(|error| self.mutation_failed("create", None, error))?;
        self.lock_state().confirm(created.id, Some(created.clone()));
        info!(appointment_id = created.id, "appointment created");

        self.refetch().await;
        Ok(created)
    }

    pub async fn update(
        &self,
        id: i64,
        changes: &AppointmentChanges,
    ) -> Result<Appointment, StoreError> {
        self.ensure_open()?;
        let pending = self.begin(id)?;
        let current = self.require(id)?;
        let candidate = changes.apply_to(&current);
        self.check_candidate(&candidate, Some(id))?;

        debug!(appointment_id = id, "submitting appointment update");
        let result = self.backend.update(id, &candidate).await;
        self.ensure_open()?;

        let updated = result.map_err(|error| self.mutation_failed("update", Some(id), error))?;
        self.lock_state().confirm(id, Some(updated.clone()));
        info!(appointment_id = id, "appointment updated");

        drop(pending);
        self.refetch().await;
        Ok(updated)
    }

    /// Drag/resize. The new bounds are shown immediately and reverted to the
    /// previous ones if the backend refuses them.
    pub async fn move_appointment(
        &self,
        id: i64,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError> {
        self.ensure_open()?;
        let pending = self.begin(id)?;
        let previous = self.require(id)?;
        let candidate = previous.with_bounds(start_at, end_at);
        self.check_candidate(&candidate, Some(id))?;

        {
            let mut state = self.lock_state();
            state.appointments.insert(id, candidate.clone());
            state.optimistic.insert(id, candidate.clone());
        }

        debug!(appointment_id = id, start = %start_at, end = %end_at, "submitting move");
        let result = self.backend.update(id, &candidate).await;
        if self.is_disposed() {
            return Err(StoreError::Disposed);
        }

        let outcome = {
            let mut state = self.lock_state();
            state.optimistic.remove(&id);
            match result {
                Ok(confirmed) => {
                    state.confirm(id, Some(confirmed.clone()));
                    Ok(confirmed)
                }
                Err(error) => {
                    if let Some(current) = state.appointments.get_mut(&id) {
                        current.start_at = previous.start_at;
                        current.end_at = previous.end_at;
                    }
                    warn!(appointment_id = id, %error, "move rejected; restored previous bounds");
                    Err(StoreError::from_mutation(error))
                }
            }
        };
        drop(pending);

        let confirmed = outcome?;
        info!(appointment_id = id, "appointment moved");
        self.refetch().await;
        Ok(confirmed)
    }

    pub async fn remove(&self, id: i64) -> Result<(), StoreError> {
        self.ensure_open()?;
        if !self.lock_state().appointments.contains_key(&id) {
            return Err(StoreError::MutationFailed(format!(
                "appointment {id} does not exist"
            )));
        }
        let pending = self.begin(id)?;

        debug!(appointment_id = id, "submitting delete");
        let result = self.backend.delete(id).await;
        self.ensure_open()?;

        result.map_err(|error| self.mutation_failed("delete", Some(id), error))?;
        self.lock_state().confirm(id, None);
        info!(appointment_id = id, "appointment deleted");

        drop(pending);
        self.refetch().await;
        Ok(())
    }

    pub fn get(&self, id: i64) -> Option<Appointment> {
        self.lock_state().appointments.get(&id).cloned()
    }

    pub fn is_pending(&self, id: i64) -> bool {
        self.lock_state().pending.contains(&id)
    }

    pub fn snapshot(&self) -> Vec<Appointment> {
        let mut appointments: Vec<Appointment> =
            self.lock_state().appointments.values().cloned().collect();
        sort_by_start(&mut appointments);
        appointments
    }

    pub fn on_date(&self, date: NaiveDate) -> Vec<Appointment> {
        let zone = self.options.display_zone;
        self.snapshot()
            .into_iter()
            .filter(|appointment| zone.local_date(appointment.start_at).ok() == Some(date))
            .collect()
    }

    pub fn upcoming(&self, now: DateTime<Utc>) -> Vec<Appointment> {
        self.snapshot()
            .into_iter()
            .filter(|appointment| appointment.start_at > now)
            .collect()
    }

    pub fn display(&self) -> Vec<AppointmentView> {
        let zone = self.options.display_zone;
        self.snapshot()
            .into_iter()
            .filter_map(|appointment| {
                let start = zone.to_display(appointment.start_at).ok()?;
                let end = zone.to_display(appointment.end_at).ok()?;
                Some(AppointmentView {
                    id: appointment.id,
                    title: appointment.title,
                    description: appointment.description,
                    start,
                    end,
                    all_day: appointment.is_all_day,
                    location: appointment.location,
                    attendees: appointment.attendees,
                })
            })
            .collect()
    }

    fn check_candidate(
        &self,
        candidate: &Appointment,
        exclude_id: Option<i64>,
    ) -> Result<(), StoreError> {
        candidate.validate().map_err(StoreError::InvalidInput)?;

        let state = self.lock_state();
        match detect_conflict(
            candidate,
            state.appointments.values(),
            exclude_id,
            &self.options.display_zone,
        ) {
            ConflictOutcome::NoConflict => Ok(()),
            ConflictOutcome::Conflict {
                reason,
                conflicting_id,
            } => {
                debug!(?conflicting_id, "local conflict; request not sent");
                Err(StoreError::Conflict {
                    message: reason,
                    conflicting_id,
                })
            }
        }
    }

    fn begin_load(&self) -> LoadTicket<'_> {
        let mut state = self.lock_state();
        state.loads_in_flight += 1;
        LoadTicket {
            state: &self.state,
            started_at: state.generation,
        }
    }

    fn begin(&self, id: i64) -> Result<PendingGuard<'_>, StoreError> {
        let mut state = self.lock_state();
        if !state.pending.insert(id) {
            return Err(StoreError::Busy(id));
        }
        Ok(PendingGuard {
            state: &self.state,
            id,
        })
    }

    fn require(&self, id: i64) -> Result<Appointment, StoreError> {
        self.get(id).ok_or_else(|| {
            StoreError::MutationFailed(format!("appointment {id} does not exist"))
        })
    }

    fn mutation_failed(&self, operation: &str, id: Option<i64>, error: BackendError) -> StoreError {
        warn!(operation, appointment_id = ?id, %error, "appointment change failed");
        StoreError::from_mutation(error)
    }

    async fn refetch(&self) {
        if !self.options.refetch_after_mutation {
            return;
        }
        if let Err(error) = self.load().await {
            warn!(%error, "refetch after change failed");
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_disposed() {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sort_by_start(appointments: &mut [Appointment]) {
    appointments.sort_by(|left, right| {
        left.start_at
            .cmp(&right.start_at)
            .then_with(|| left.id.cmp(&right.id))
    });
}
