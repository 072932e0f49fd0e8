use chrono::Local;
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use appointment_cell::Appointment;
use shared_config::AppConfig;
use shared_database::{return_representation, SupabaseClient};
use shared_models::auth::{User, ROLE_PATIENT};
use shared_models::profile::UserProfile;

use crate::models::{PatientDashboard, PatientError};

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_profile(&self, patient_id: &str, auth_token: &str) -> Result<UserProfile, PatientError> {
        debug!("Fetching patient profile: {}", patient_id);
        self.supabase
            .get_user(patient_id, Some(ROLE_PATIENT), auth_token)
            .await?
            .ok_or(PatientError::NotFound)
    }

    pub async fn update_profile(
        &self,
        patient_id: &str,
        changes: Map<String, Value>,
        auth_token: &str,
    ) -> Result<UserProfile, PatientError> {
        let path = format!("/rest/v1/users?id=eq.{}&role=eq.{}", patient_id, ROLE_PATIENT);
        let rows: Vec<UserProfile> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(changes)),
            Some(return_representation()),
        ).await?;

        let profile = rows.into_iter().next().ok_or(PatientError::NotFound)?;
        info!("Patient {} updated their profile", patient_id);
        Ok(profile)
    }

    /// A patient may read their own profile; a doctor may read the profile
    /// of anyone who has booked with them.
    pub async fn get_patient(
        &self,
        viewer: &User,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<UserProfile, PatientError> {
        if viewer.id != patient_id {
            if !viewer.is_doctor() {
                return Err(PatientError::Unauthorized);
            }
            let path = format!(
                "/rest/v1/appointments?doctor_id=eq.{}&patient_id=eq.{}&select=id&limit=1",
                viewer.id, patient_id
            );
            let shared: Vec<Value> = self.supabase.fetch_all(&path, auth_token).await?;
            if shared.is_empty() {
                warn!("Doctor {} tried to read unrelated patient {}", viewer.id, patient_id);
                return Err(PatientError::Unauthorized);
            }
        }

        self.get_profile(patient_id, auth_token).await
    }

    pub async fn dashboard(&self, patient_id: &str, auth_token: &str) -> Result<PatientDashboard, PatientError> {
        let now = Local::now().naive_local();

        let upcoming: Vec<Appointment> = self.supabase.fetch_all(
            &format!(
                "/rest/v1/appointments?patient_id=eq.{}&status=eq.scheduled&date=gte.{}&order=date.asc,time.asc",
                patient_id,
                now.date()
            ),
            auth_token,
        ).await?;
        let upcoming: Vec<Appointment> = upcoming.into_iter().filter(|a| a.starts_at() > now).collect();

        let chats: Vec<Value> = self.supabase.fetch_all(
            &format!("/rest/v1/chats?patient_id=eq.{}&status=in.(pending,accepted)&select=id", patient_id),
            auth_token,
        ).await?;

        let reports: Vec<Value> = self.supabase.fetch_all(
            &format!("/rest/v1/medical_reports?patient_id=eq.{}&select=id", patient_id),
            auth_token,
        ).await?;

        Ok(PatientDashboard {
            upcoming_appointments: upcoming.len(),
            next_appointment: upcoming.into_iter().next(),
            active_chats: chats.len(),
            reports: reports.len(),
        })
    }
}
