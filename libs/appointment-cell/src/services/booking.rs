// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{Local, NaiveDateTime, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use notification_cell::{templates, Mailer};
use shared_config::AppConfig;
use shared_database::{return_representation, SchedulingLock, SupabaseClient, SupabaseError};
use shared_models::auth::{User, ROLE_DOCTOR, ROLE_PATIENT};
use slot_cell::Slot;

use crate::models::{
    Appointment, AppointmentError, AppointmentScope, AppointmentStatus, CancellationResult,
};
use crate::services::lifecycle::AppointmentLifecycleService;

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    lock: SchedulingLock,
    lifecycle_service: AppointmentLifecycleService,
    mailer: Arc<dyn Mailer>,
}

impl AppointmentBookingService {
    pub fn with_mailer(config: &AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        let supabase = SupabaseClient::new(config);
        Self {
            lock: SchedulingLock::new(supabase.clone()),
            supabase,
            lifecycle_service: AppointmentLifecycleService::new(),
            mailer,
        }
    }

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    /// Book `slot_id` for the patient. The availability check and the insert
    /// run under the doctor's day lock.
    #[instrument(skip(self, auth_token))]
    pub async fn book_appointment(
        &self,
        patient_id: &str,
        slot_id: &str,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let slot: Slot = self.supabase
            .fetch_one(&format!("/rest/v1/slots?id=eq.{}", slot_id), auth_token)
            .await?
            .ok_or(AppointmentError::SlotNotFound)?;

        if slot.starts_at() <= Self::now() {
            return Err(AppointmentError::SlotInPast);
        }

        let doctor_id = slot.doctor_id.to_string();
        let lock_key = SchedulingLock::day_key(&doctor_id, &slot.date);

        let appointment = self.lock.with_lock(&lock_key, patient_id, auth_token, || async {
            let path = format!(
                "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&status=eq.scheduled",
                doctor_id, slot.date
            );
            let active: Vec<Appointment> = self.supabase.fetch_all(&path, auth_token).await?;

            if active.iter().any(|a| a.time == slot.time) {
                return Err(AppointmentError::SlotTaken.into());
            }
            if active.iter().any(|a| a.patient_id.to_string() == patient_id) {
                return Err(AppointmentError::DuplicateBooking.into());
            }

            let now = Utc::now().to_rfc3339();
            let inserted: Vec<Appointment> = self.supabase.request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(json!({
                    "doctor_id": slot.doctor_id,
                    "patient_id": patient_id,
                    "slot_id": slot.id,
                    "date": slot.date,
                    "time": slot.time,
                    "status": AppointmentStatus::Scheduled,
                    "reason": reason,
                    "created_at": now,
                    "updated_at": now,
                })),
                Some(return_representation()),
            ).await.map_err(|e| {
                // The unique index on active appointments caught a concurrent booking.
                if SupabaseError::is_conflict(&e) {
                    AppointmentError::SlotTaken.into()
                } else {
                    e
                }
            })?;

            inserted.into_iter().next()
                .ok_or_else(|| anyhow!("Insert returned no appointment row"))
        }).await?;

        info!(
            "Patient {} booked appointment {} with doctor {} on {} {}",
            patient_id, appointment.id, appointment.doctor_id, appointment.date, appointment.time
        );
        Ok(appointment)
    }

    pub async fn get_appointment(&self, appointment_id: &str, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        self.supabase.fetch_one(&path, auth_token).await?
            .ok_or(AppointmentError::NotFound)
    }

    /// Fetch an appointment the caller takes part in.
    pub async fn get_for_participant(
        &self,
        appointment_id: &str,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        if !appointment.is_participant(user_id) {
            return Err(AppointmentError::NotParticipant);
        }
        Ok(appointment)
    }

    pub async fn list_appointments(
        &self,
        user: &User,
        scope: AppointmentScope,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let column = if user.is_doctor() { "doctor_id" } else { "patient_id" };
        let today = Local::now().date_naive();

        let filter = match scope {
            AppointmentScope::Upcoming => format!(
                "status=eq.scheduled&date=gte.{}&order=date.asc,time.asc",
                today
            ),
            AppointmentScope::Past => format!(
                "or=(status.neq.scheduled,date.lt.{})&order=date.desc,time.desc",
                today
            ),
            AppointmentScope::All => "order=date.desc,time.desc".to_string(),
        };

        let path = format!("/rest/v1/appointments?{}=eq.{}&{}", column, user.id, filter);
        let appointments: Vec<Appointment> = self.supabase.fetch_all(&path, auth_token).await?;
        debug!("Found {} {:?} appointments for {}", appointments.len(), scope, user.id);

        Ok(appointments)
    }

    /// Cancel a scheduled appointment. When the doctor cancels, the patient
    /// is emailed; mail failures only clear `notification_sent`.
    #[instrument(skip(self, user, auth_token), fields(user_id = %user.id))]
    pub async fn cancel_appointment(
        &self,
        user: &User,
        appointment_id: &str,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<CancellationResult, AppointmentError> {
        let appointment = self.get_for_participant(appointment_id, &user.id, auth_token).await?;

        let by_doctor = appointment.doctor_id.to_string() == user.id;
        let reason = reason.unwrap_or_else(|| {
            if by_doctor { "Canceled by doctor" } else { "Canceled by patient" }.to_string()
        });

        let canceled = self
            .transition(&appointment, AppointmentStatus::Canceled, Some(&reason), auth_token)
            .await?;

        let notification_sent = if by_doctor {
            self.notify_patient(&canceled, &reason, auth_token).await
        } else {
            false
        };

        info!("Appointment {} canceled by {}", canceled.id, user.id);
        Ok(CancellationResult { appointment: canceled, notification_sent })
    }

    #[instrument(skip(self, user, auth_token), fields(user_id = %user.id))]
    pub async fn complete_appointment(
        &self,
        user: &User,
        appointment_id: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        if appointment.doctor_id.to_string() != user.id {
            return Err(AppointmentError::NotParticipant);
        }

        let completed = self
            .transition(&appointment, AppointmentStatus::Completed, None, auth_token)
            .await?;

        info!("Appointment {} completed", completed.id);
        Ok(completed)
    }

    /// Move `appointment` to `new_status`. The update is conditional on the
    /// row still being scheduled, so a concurrent change surfaces as an
    /// invalid transition instead of being overwritten.
    pub async fn transition(
        &self,
        appointment: &Appointment,
        new_status: AppointmentStatus,
        cancellation_reason: Option<&str>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.lifecycle_service.validate_status_transition(appointment.status, new_status)?;

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment.id, appointment.status
        );
        let mut body = json!({
            "status": new_status,
            "updated_at": Utc::now().to_rfc3339(),
        });
        if let Some(reason) = cancellation_reason {
            body["cancellation_reason"] = json!(reason);
        }

        let updated: Vec<Appointment> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(body),
            Some(return_representation()),
        ).await?;

        updated.into_iter().next().ok_or_else(|| {
            warn!("Appointment {} changed status concurrently", appointment.id);
            AppointmentError::InvalidStatusTransition { from: appointment.status, to: new_status }
        })
    }

    async fn notify_patient(&self, appointment: &Appointment, reason: &str, auth_token: &str) -> bool {
        let patient = self.supabase
            .get_user(&appointment.patient_id.to_string(), Some(ROLE_PATIENT), auth_token).await;
        let doctor = self.supabase
            .get_user(&appointment.doctor_id.to_string(), Some(ROLE_DOCTOR), auth_token).await;

        let (patient, doctor) = match (patient, doctor) {
            (Ok(Some(patient)), Ok(Some(doctor))) => (patient, doctor),
            _ => {
                warn!("Could not load participants of appointment {}, skipping email", appointment.id);
                return false;
            }
        };

        let email = templates::appointment_canceled_email(
            templates::Recipient { email: &patient.email, name: &patient.full_name },
            &doctor.full_name,
            appointment.date,
            appointment.time,
            reason,
        );

        match self.mailer.send(email).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Cancellation email for appointment {} failed: {}", appointment.id, e);
                false
            }
        }
    }
}
