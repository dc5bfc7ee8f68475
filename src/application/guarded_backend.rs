use crate::application::session_guard::SessionAccess;
use crate::domain::models::Appointment;
use crate::infrastructure::appointment_client::AppointmentApi;
use crate::infrastructure::error::BackendError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// The backend as the appointment store sees it: credentials are already
/// taken care of.
#[async_trait]
pub trait AppointmentBackend: Send + Sync {
    async fn list(&self) -> Result<Vec<Appointment>, BackendError>;

    async fn create(&self, appointment: &Appointment) -> Result<Appointment, BackendError>;

    async fn update(
        &self,
        id: i64,
        appointment: &Appointment,
    ) -> Result<Appointment, BackendError>;

    async fn delete(&self, id: i64) -> Result<(), BackendError>;
}

/// Wraps every transport call with the session: a missing or expired token
/// short-circuits to `Unauthorized`, and an `Unauthorized` answer from the
/// backend logs the session out.
pub struct GuardedBackend<A, G>
where
    A: AppointmentApi,
    G: SessionAccess,
{
    api: Arc<A>,
    session: Arc<G>,
}

impl<A, G> GuardedBackend<A, G>
where
    A: AppointmentApi,
    G: SessionAccess,
{
    pub fn new(api: Arc<A>, session: Arc<G>) -> Self {
        Self { api, session }
    }

    fn access_token(&self, operation: &str) -> Result<String, BackendError> {
        self.session.access_token().ok_or_else(|| {
            debug!(operation, "no valid session token; request not sent");
            BackendError::Unauthorized
        })
    }

    fn inspect<T>(
        &self,
        operation: &str,
        result: Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        if let Err(BackendError::Unauthorized) = &result {
            warn!(operation, "backend rejected session credential");
            self.session.handle_rejection();
        }
        result
    }
}

#[async_trait]
impl<A, G> AppointmentBackend for GuardedBackend<A, G>
where
    A: AppointmentApi,
    G: SessionAccess,
{
    async fn list(&self) -> Result<Vec<Appointment>, BackendError> {
        let token = self.access_token("list")?;
        let result = self.api.list(&token).await;
        self.inspect("list", result)
    }

    async fn create(&self, appointment: &Appointment) -> Result<Appointment, BackendError> {
        let token = self.access_token("create")?;
        let result = self.api.create(&token, appointment).await;
        self.inspect("create", result)
    }

    async fn update(
        &self,
        id: i64,
        appointment: &Appointment,
    ) -> Result<Appointment, BackendError> {
        let token = self.access_token("update")?;
        let result = self.api.update(&token, id, appointment).await;
        self.inspect("update", result)
    }

    async fn delete(&self, id: i64) -> Result<(), BackendError> {
        let token = self.access_token("delete")?;
        let result = self.api.delete(&token, id).await;
        self.inspect("delete", result)
    }
}
