// libs/slot-cell/src/services/slot.rs
//
// Doctor availability slots: bulk creation with de-duplication under the
// day lock, listings, and the delete-and-cancel cascade.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use notification_cell::{templates, Mailer};
use shared_config::AppConfig;
use shared_database::{return_representation, SchedulingLock, SupabaseClient};
use shared_models::auth::{ROLE_DOCTOR, ROLE_PATIENT};

use crate::models::{
    BookedAppointment, Slot, SlotDeletionResult, SlotError, SlotGenerationResult, SlotView,
    SlotWindow,
};
use crate::services::generation::generate_slot_times;

pub const SLOT_REMOVED_REASON: &str = "Doctor removed this slot";

pub struct SlotService {
    supabase: SupabaseClient,
    lock: SchedulingLock,
    mailer: Arc<dyn Mailer>,
}

impl SlotService {
    pub fn with_mailer(config: &AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        let supabase = SupabaseClient::new(config);
        Self {
            lock: SchedulingLock::new(supabase.clone()),
            supabase,
            mailer,
        }
    }

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    /// Create every missing 30-minute slot inside `window`.
    #[instrument(skip(self, auth_token))]
    pub async fn create_slots(
        &self,
        doctor_id: &str,
        window: SlotWindow,
        auth_token: &str,
    ) -> Result<SlotGenerationResult, SlotError> {
        let now = Self::now();

        if window.date < now.date() {
            return Err(SlotError::ValidationError("Cannot add slots for a past date".to_string()));
        }
        if window.start_time >= window.end_time {
            return Err(SlotError::ValidationError("Start time must be before end time".to_string()));
        }

        let times = generate_slot_times(window.date, window.start_time, window.end_time, now);
        if times.is_empty() {
            return Err(SlotError::ValidationError(format!(
                "No 30-minute slot fits between {} and {}",
                window.start_time.format("%H:%M"),
                window.end_time.format("%H:%M")
            )));
        }

        let lock_key = SchedulingLock::day_key(doctor_id, &window.date);
        let result = self.lock.with_lock(&lock_key, doctor_id, auth_token, || async {
            let existing = self.existing_times(doctor_id, window.date, auth_token).await?;

            let (skipped, fresh): (Vec<NaiveTime>, Vec<NaiveTime>) =
                times.iter().partition(|time| existing.contains(*time));

            if fresh.is_empty() {
                debug!("All {} requested slots already exist", skipped.len());
                return Ok(SlotGenerationResult { created: Vec::new(), skipped });
            }

            let rows: Vec<Value> = fresh.iter()
                .map(|time| json!({
                    "doctor_id": doctor_id,
                    "date": window.date,
                    "time": time,
                    "created_at": Utc::now().to_rfc3339(),
                }))
                .collect();

            let inserted: Vec<Slot> = self.supabase.request_with_headers(
                Method::POST,
                "/rest/v1/slots",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(return_representation()),
            ).await?;

            Ok::<_, anyhow::Error>(SlotGenerationResult { created: inserted, skipped })
        }).await?;

        info!(
            "Doctor {} added {} slots on {} ({} duplicates skipped)",
            doctor_id, result.created.len(), window.date, result.skipped.len()
        );
        Ok(result)
    }

    async fn existing_times(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: &str,
    ) -> anyhow::Result<HashSet<NaiveTime>> {
        let slots = self.slots_on(doctor_id, date, auth_token).await?;
        Ok(slots.into_iter().map(|slot| slot.time).collect())
    }

    async fn slots_on(&self, doctor_id: &str, date: NaiveDate, auth_token: &str) -> anyhow::Result<Vec<Slot>> {
        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&date=eq.{}&order=time.asc",
            doctor_id, date
        );
        self.supabase.fetch_all(&path, auth_token).await
    }

    /// (date, time) pairs holding a scheduled appointment for the doctor.
    async fn booked_times(
        &self,
        doctor_id: &str,
        date_filter: &str,
        auth_token: &str,
    ) -> anyhow::Result<HashSet<(NaiveDate, NaiveTime)>> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=eq.scheduled&{}&select=id,doctor_id,patient_id,date,time,status",
            doctor_id, date_filter
        );
        let booked: Vec<BookedAppointment> = self.supabase.fetch_all(&path, auth_token).await?;
        Ok(booked.into_iter().map(|a| (a.date, a.time)).collect())
    }

    pub async fn get_slot(&self, slot_id: &str, auth_token: &str) -> Result<Slot, SlotError> {
        let path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        self.supabase.fetch_one(&path, auth_token).await?
            .ok_or(SlotError::NotFound)
    }

    /// The doctor's own slots from `from` onward, flagged when booked.
    pub async fn list_doctor_slots(
        &self,
        doctor_id: &str,
        from: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<SlotView>, SlotError> {
        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&date=gte.{}&order=date.asc,time.asc",
            doctor_id, from
        );
        let slots: Vec<Slot> = self.supabase.fetch_all(&path, auth_token).await?;
        let booked = self.booked_times(doctor_id, &format!("date=gte.{}", from), auth_token).await?;

        Ok(slots.into_iter()
            .map(|slot| {
                let is_booked = booked.contains(&(slot.date, slot.time));
                SlotView { slot, is_booked }
            })
            .collect())
    }

    /// Slots a patient can still book with `doctor_id` on `date`.
    pub async fn list_available_slots(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        let now = Self::now();
        if date < now.date() {
            return Err(SlotError::ValidationError("Date is in the past".to_string()));
        }

        let slots = self.slots_on(doctor_id, date, auth_token).await?;
        let booked = self.booked_times(doctor_id, &format!("date=eq.{}", date), auth_token).await?;

        Ok(slots.into_iter()
            .filter(|slot| !booked.contains(&(slot.date, slot.time)))
            .filter(|slot| slot.starts_at() > now)
            .collect())
    }

    /// Delete a slot; an appointment booked on it is canceled first and its
    /// patient notified. A failed delete restores the appointment.
    #[instrument(skip(self, auth_token))]
    pub async fn delete_slot(
        &self,
        doctor_id: &str,
        slot_id: &str,
        auth_token: &str,
    ) -> Result<SlotDeletionResult, SlotError> {
        let slot = self.get_slot(slot_id, auth_token).await?;
        if slot.doctor_id.to_string() != doctor_id {
            return Err(SlotError::NotOwner);
        }

        let lock_key = SchedulingLock::day_key(doctor_id, &slot.date);
        let canceled = self.lock.with_lock(&lock_key, doctor_id, auth_token, || async {
            let active = self.find_active_appointment(&slot, auth_token).await?;

            if let Some(appointment) = &active {
                self.set_appointment_status(appointment.id, "canceled", Some(SLOT_REMOVED_REASON), auth_token).await?;
                debug!("Appointment {} canceled ahead of slot removal", appointment.id);
            }

            let delete_path = format!("/rest/v1/slots?id=eq.{}", slot.id);
            if let Err(e) = self.supabase.execute(Method::DELETE, &delete_path, Some(auth_token), None).await {
                if let Some(appointment) = &active {
                    warn!("Slot delete failed, restoring appointment {}", appointment.id);
                    if let Err(restore_err) = self.set_appointment_status(appointment.id, "scheduled", None, auth_token).await {
                        error!("Could not restore appointment {}: {}", appointment.id, restore_err);
                    }
                }
                return Err(e);
            }

            Ok::<_, anyhow::Error>(active)
        }).await?;

        let notification_sent = match &canceled {
            Some(appointment) => self.notify_patient(appointment, auth_token).await,
            None => false,
        };

        info!("Doctor {} deleted slot {} on {} {}", doctor_id, slot.id, slot.date, slot.time);

        Ok(SlotDeletionResult {
            slot_id: slot.id,
            canceled_appointment_id: canceled.map(|a| a.id),
            notification_sent,
        })
    }

    async fn find_active_appointment(
        &self,
        slot: &Slot,
        auth_token: &str,
    ) -> anyhow::Result<Option<BookedAppointment>> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&time=eq.{}&status=eq.scheduled&limit=1",
            slot.doctor_id, slot.date, slot.time.format("%H:%M:%S")
        );
        self.supabase.fetch_one(&path, auth_token).await
    }

    async fn set_appointment_status(
        &self,
        appointment_id: Uuid,
        status: &str,
        reason: Option<&str>,
        auth_token: &str,
    ) -> anyhow::Result<()> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        self.supabase.execute(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({
                "status": status,
                "cancellation_reason": reason,
                "updated_at": Utc::now().to_rfc3339(),
            })),
        ).await
    }

    /// Mail failures are logged and reported, never propagated.
    async fn notify_patient(&self, appointment: &BookedAppointment, auth_token: &str) -> bool {
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
            SLOT_REMOVED_REASON,
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
