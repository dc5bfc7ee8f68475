use crate::application::guarded_backend::AppointmentBackend;
use crate::domain::models::Appointment;
use crate::infrastructure::error::BackendError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub(crate) fn fixed_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("valid datetime")
        .with_timezone(&Utc)
}

pub(crate) fn sample_appointment(id: i64, start: &str, end: &str) -> Appointment {
    Appointment {
        id,
        title: format!("Appointment {id}"),
        description: "details".to_string(),
        start_at: fixed_time(start),
        end_at: fixed_time(end),
        is_all_day: false,
        location: None,
        attendees: None,
    }
}

/// Parks the next call of one kind until the test releases it.
#[derive(Debug, Default)]
pub(crate) struct CallGate {
    pub entered: Notify,
    pub release: Notify,
}

/// Scripted backend. Unscripted calls succeed: list returns nothing, create
/// assigns the next id, update echoes the record and delete is accepted.
#[derive(Debug)]
pub(crate) struct FakeBackend {
    list_responses: Mutex<VecDeque<Result<Vec<Appointment>, BackendError>>>,
    create_responses: Mutex<VecDeque<Result<Appointment, BackendError>>>,
    update_responses: Mutex<VecDeque<Result<Appointment, BackendError>>>,
    delete_responses: Mutex<VecDeque<Result<(), BackendError>>>,
    list_gate: Mutex<Option<Arc<CallGate>>>,
    update_gate: Mutex<Option<Arc<CallGate>>>,
    next_id: AtomicI64,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            list_responses: Mutex::new(VecDeque::new()),
            create_responses: Mutex::new(VecDeque::new()),
            update_responses: Mutex::new(VecDeque::new()),
            delete_responses: Mutex::new(VecDeque::new()),
            list_gate: Mutex::new(None),
            update_gate: Mutex::new(None),
            next_id: AtomicI64::new(100),
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeBackend {
    pub(crate) fn push_list(&self, response: Result<Vec<Appointment>, BackendError>) {
        self.list_responses
            .lock()
            .expect("list mutex poisoned")
            .push_back(response);
    }

    pub(crate) fn push_create(&self, response: Result<Appointment, BackendError>) {
        self.create_responses
            .lock()
            .expect("create mutex poisoned")
            .push_back(response);
    }

    pub(crate) fn push_update(&self, response: Result<Appointment, BackendError>) {
        self.update_responses
            .lock()
            .expect("update mutex poisoned")
            .push_back(response);
    }

    pub(crate) fn push_delete(&self, response: Result<(), BackendError>) {
        self.delete_responses
            .lock()
            .expect("delete mutex poisoned")
            .push_back(response);
    }

    pub(crate) fn hold_lists(&self) -> Arc<CallGate> {
        let gate = Arc::new(CallGate::default());
        *self.list_gate.lock().expect("gate mutex poisoned") = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn hold_updates(&self) -> Arc<CallGate> {
        let gate = Arc::new(CallGate::default());
        *self.update_gate.lock().expect("gate mutex poisoned") = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl AppointmentBackend for FakeBackend {
    async fn list(&self) -> Result<Vec<Appointment>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.list_gate.lock().expect("gate mutex poisoned").take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.list_responses
            .lock()
            .expect("list mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create(&self, appointment: &Appointment) -> Result<Appointment, BackendError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .create_responses
            .lock()
            .expect("create mutex poisoned")
            .pop_front();
        scripted.unwrap_or_else(|| {
            let mut created = appointment.clone();
            created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(created)
        })
    }

    async fn update(
        &self,
        id: i64,
        appointment: &Appointment,
    ) -> Result<Appointment, BackendError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.update_gate.lock().expect("gate mutex poisoned").take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let scripted = self
            .update_responses
            .lock()
            .expect("update mutex poisoned")
            .pop_front();
        scripted.unwrap_or_else(|| {
            let mut updated = appointment.clone();
            updated.id = id;
            Ok(updated)
        })
    }

    async fn delete(&self, _id: i64) -> Result<(), BackendError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.delete_responses
            .lock()
            .expect("delete mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}
