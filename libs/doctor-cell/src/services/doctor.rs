use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{Local, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use appointment_cell::{Appointment, AppointmentStatus};
use shared_config::AppConfig;
use shared_database::{return_representation, SupabaseClient, SupabaseError};
use shared_models::auth::ROLE_DOCTOR;
use shared_models::profile::UserProfile;

use crate::models::{
    average_rating, DoctorDashboard, DoctorError, DoctorSearchQuery, DoctorSummary, Rating, RatingScore,
};

#[derive(Debug, Deserialize)]
struct ScheduledTime {
    date: NaiveDate,
    time: NaiveTime,
}

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Anonymous read for the public directory.
    async fn public_rows<T>(&self, path: &str) -> Result<Vec<T>>
    where T: serde::de::DeserializeOwned {
        self.supabase.request(Method::GET, path, None, None).await
    }

    async fn scores(&self, doctor_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<i32>>> {
        if doctor_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<String> = doctor_ids.iter().map(Uuid::to_string).collect();
        let path = format!("/rest/v1/ratings?doctor_id=in.({})&select=doctor_id,rating", ids.join(","));
        let rows: Vec<RatingScore> = self.public_rows(&path).await?;

        let mut by_doctor: HashMap<Uuid, Vec<i32>> = HashMap::new();
        for row in rows {
            by_doctor.entry(row.doctor_id).or_default().push(row.rating);
        }
        Ok(by_doctor)
    }

    fn summarize(profiles: Vec<UserProfile>, scores: &HashMap<Uuid, Vec<i32>>) -> Vec<DoctorSummary> {
        profiles
            .into_iter()
            .map(|profile| {
                let doctor_scores = scores.get(&profile.id).map(Vec::as_slice).unwrap_or(&[]);
                DoctorSummary {
                    average_rating: average_rating(doctor_scores),
                    rating_count: doctor_scores.len(),
                    profile,
                }
            })
            .collect()
    }

    /// Doctors by name, optionally narrowed to one specialization.
    pub async fn list_doctors(&self, query: &DoctorSearchQuery) -> Result<Vec<DoctorSummary>, DoctorError> {
        let mut path = format!("/rest/v1/users?role=eq.{}&order=full_name.asc", ROLE_DOCTOR);

        if let Some(specialization) = query.specialization.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            path.push_str(&format!("&specialization=eq.{}", urlencoding::encode(specialization)));
        }
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let term = urlencoding::encode(term);
            path.push_str(&format!("&or=(full_name.ilike.*{}*,specialization.ilike.*{}*)", term, term));
        }

        let profiles: Vec<UserProfile> = self.public_rows(&path).await?;
        let ids: Vec<Uuid> = profiles.iter().map(|p| p.id).collect();
        let scores = self.scores(&ids).await?;

        debug!("Found {} doctors", profiles.len());
        Ok(Self::summarize(profiles, &scores))
    }

    pub async fn get_doctor(&self, doctor_id: &str) -> Result<DoctorSummary, DoctorError> {
        let path = format!("/rest/v1/users?id=eq.{}&role=eq.{}", doctor_id, ROLE_DOCTOR);
        let profiles: Vec<UserProfile> = self.public_rows(&path).await?;
        let profile = profiles.into_iter().next().ok_or(DoctorError::NotFound)?;

        let scores = self.scores(&[profile.id]).await?;
        Self::summarize(vec![profile], &scores)
            .into_iter()
            .next()
            .ok_or(DoctorError::NotFound)
    }

    pub async fn update_profile(
        &self,
        doctor_id: &str,
        changes: Map<String, Value>,
        auth_token: &str,
    ) -> Result<UserProfile, DoctorError> {
        let path = format!("/rest/v1/users?id=eq.{}&role=eq.{}", doctor_id, ROLE_DOCTOR);
        let rows: Vec<UserProfile> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(changes)),
            Some(return_representation()),
        ).await?;

        let profile = rows.into_iter().next().ok_or(DoctorError::NotFound)?;
        info!("Doctor {} updated their profile", doctor_id);
        Ok(profile)
    }

    // ==========================================================================
    // RATINGS
    // ==========================================================================

    /// One rating per completed appointment between this patient and doctor.
    #[instrument(skip(self, comment, auth_token))]
    pub async fn rate_doctor(
        &self,
        patient_id: &str,
        doctor_id: &str,
        appointment_id: &str,
        rating: i32,
        comment: Option<String>,
        auth_token: &str,
    ) -> Result<Rating, DoctorError> {
        if !(1..=5).contains(&rating) {
            return Err(DoctorError::ValidationError("rating must be between 1 and 5".to_string()));
        }

        let appointment: Appointment = self.supabase
            .fetch_one(&format!("/rest/v1/appointments?id=eq.{}", appointment_id), auth_token)
            .await?
            .ok_or(DoctorError::AppointmentNotFound)?;

        if appointment.patient_id.to_string() != patient_id || appointment.doctor_id.to_string() != doctor_id {
            return Err(DoctorError::NotYourAppointment);
        }
        if appointment.status != AppointmentStatus::Completed {
            return Err(DoctorError::AppointmentNotCompleted);
        }

        let existing_path = format!("/rest/v1/ratings?appointment_id=eq.{}", appointment_id);
        let existing: Option<Rating> = self.supabase.fetch_one(&existing_path, auth_token).await?;
        if existing.is_some() {
            return Err(DoctorError::AlreadyRated);
        }

        let body = json!({
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "appointment_id": appointment_id,
            "rating": rating,
            "comment": comment,
            "created_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<Rating> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/ratings",
            Some(auth_token),
            Some(body),
            Some(return_representation()),
        ).await.map_err(|e| {
            if SupabaseError::is_conflict(&e) {
                DoctorError::AlreadyRated
            } else {
                DoctorError::from(e)
            }
        })?;

        let created = rows.into_iter().next()
            .ok_or_else(|| DoctorError::DatabaseError("Insert returned no rating row".to_string()))?;
        info!("Patient {} rated doctor {} with {}", patient_id, doctor_id, rating);
        Ok(created)
    }

    pub async fn list_ratings(&self, doctor_id: &str) -> Result<Vec<Rating>, DoctorError> {
        let path = format!("/rest/v1/ratings?doctor_id=eq.{}&order=created_at.desc", doctor_id);
        Ok(self.public_rows(&path).await?)
    }

    // ==========================================================================
    // DASHBOARD
    // ==========================================================================

    pub async fn dashboard(&self, doctor_id: &str, auth_token: &str) -> Result<DoctorDashboard, DoctorError> {
        let today = Local::now().date_naive();

        let upcoming: Vec<ScheduledTime> = self.supabase.fetch_all(
            &format!(
                "/rest/v1/appointments?doctor_id=eq.{}&status=eq.scheduled&date=gte.{}&select=date,time",
                doctor_id, today
            ),
            auth_token,
        ).await?;

        let slots: Vec<ScheduledTime> = self.supabase.fetch_all(
            &format!("/rest/v1/slots?doctor_id=eq.{}&date=gte.{}&select=date,time", doctor_id, today),
            auth_token,
        ).await?;

        let pending_chats: Vec<Value> = self.supabase.fetch_all(
            &format!("/rest/v1/chats?doctor_id=eq.{}&status=eq.pending&select=id", doctor_id),
            auth_token,
        ).await?;

        let reports: Vec<Value> = self.supabase.fetch_all(
            &format!("/rest/v1/medical_reports?doctor_id=eq.{}&select=id", doctor_id),
            auth_token,
        ).await?;

        let scores: Vec<RatingScore> = self.supabase.fetch_all(
            &format!("/rest/v1/ratings?doctor_id=eq.{}&select=doctor_id,rating", doctor_id),
            auth_token,
        ).await?;
        let scores: Vec<i32> = scores.into_iter().map(|s| s.rating).collect();

        let booked: HashSet<(NaiveDate, NaiveTime)> = upcoming.iter().map(|a| (a.date, a.time)).collect();

        Ok(DoctorDashboard {
            todays_appointments: upcoming.iter().filter(|a| a.date == today).count(),
            upcoming_appointments: upcoming.len(),
            pending_chats: pending_chats.len(),
            reports_written: reports.len(),
            open_slots: slots.iter().filter(|s| !booked.contains(&(s.date, s.time))).count(),
            average_rating: average_rating(&scores),
            rating_count: scores.len(),
        })
    }
}
