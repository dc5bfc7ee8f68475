use crate::domain::models::Appointment;
use crate::infrastructure::appointment_mapper::{
    decode_appointment, decode_appointments, decode_persisted_appointment, encode_appointment,
    AppointmentRecord,
};
use crate::infrastructure::error::BackendError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use url::Url;

#[async_trait]
pub trait AppointmentApi: Send + Sync {
    async fn list(&self, access_token: &str) -> Result<Vec<Appointment>, BackendError>;

    async fn create(
        &self,
        access_token: &str,
        appointment: &Appointment,
    ) -> Result<Appointment, BackendError>;

    async fn update(
        &self,
        access_token: &str,
        id: i64,
        appointment: &Appointment,
    ) -> Result<Appointment, BackendError>;

    async fn delete(&self, access_token: &str, id: i64) -> Result<(), BackendError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestAppointmentClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ReqwestAppointmentClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn appointments_endpoint(&self) -> Result<Url, BackendError> {
        self.base_url
            .join("appointments")
            .map_err(|error| BackendError::Other(format!("invalid appointments url: {error}")))
    }

    fn appointment_endpoint(&self, id: i64) -> Result<Url, BackendError> {
        let mut url = self.appointments_endpoint()?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                BackendError::Other("appointments URL cannot be a base".to_string())
            })?;
            segments.push(&id.to_string());
        }
        Ok(url)
    }

    async fn send(
        request: RequestBuilder,
        access_token: &str,
        operation: &str,
    ) -> Result<String, BackendError> {
        let response = request
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| {
                BackendError::Other(format!("network error while {operation}: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            BackendError::Other(format!("failed reading response while {operation}: {error}"))
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|parsed| parsed.message)
                .or_else(|| (!body.trim().is_empty()).then(|| body.clone()));
            return Err(BackendError::from_status(status.as_u16(), message));
        }
        Ok(body)
    }

    fn parse_record(body: &str, operation: &str) -> Result<AppointmentRecord, BackendError> {
        serde_json::from_str(body).map_err(|error| {
            BackendError::Other(format!("invalid payload while {operation}: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl AppointmentApi for ReqwestAppointmentClient {
    async fn list(&self, access_token: &str) -> Result<Vec<Appointment>, BackendError> {
        let endpoint = self.appointments_endpoint()?;
        let body =
            Self::send(self.client.get(endpoint), access_token, "listing appointments").await?;

        let records: Vec<AppointmentRecord> = serde_json::from_str(&body).map_err(|error| {
            BackendError::Other(format!("invalid appointment list payload: {error}; body={body}"))
        })?;
        decode_appointments(&records)
    }

    async fn create(
        &self,
        access_token: &str,
        appointment: &Appointment,
    ) -> Result<Appointment, BackendError> {
        let endpoint = self.appointments_endpoint()?;
        let record = encode_appointment(appointment);
        let body = Self::send(
            self.client.post(endpoint).json(&record),
            access_token,
            "creating appointment",
        )
        .await?;

        decode_persisted_appointment(&Self::parse_record(&body, "creating appointment")?)
    }

    async fn update(
        &self,
        access_token: &str,
        id: i64,
        appointment: &Appointment,
    ) -> Result<Appointment, BackendError> {
        let endpoint = self.appointment_endpoint(id)?;
        let mut record = encode_appointment(appointment);
        record.id = Some(id);
        let body = Self::send(
            self.client.put(endpoint).json(&record),
            access_token,
            "updating appointment",
        )
        .await?;

        // a bodiless success confirms the submitted record as-is
        if body.trim().is_empty() {
            return Ok(Appointment {
                id,
                ..appointment.clone()
            });
        }
        let mut updated = decode_appointment(&Self::parse_record(&body, "updating appointment")?)?;
        updated.id = id;
        Ok(updated)
    }

    async fn delete(&self, access_token: &str, id: i64) -> Result<(), BackendError> {
        let endpoint = self.appointment_endpoint(id)?;
        Self::send(self.client.delete(endpoint), access_token, "deleting appointment").await?;
        Ok(())
    }
}
