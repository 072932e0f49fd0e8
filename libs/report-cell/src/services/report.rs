// libs/report-cell/src/services/report.rs
//
// Medical reports: the edit form, the save flow with compensating writes,
// PDF storage and the report email.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::{Appointment, AppointmentBookingService, AppointmentStatus};
use notification_cell::{templates, EmailAttachment, Mailer};
use shared_config::AppConfig;
use shared_database::{return_representation, SupabaseClient};
use shared_models::auth::{User, ROLE_DOCTOR, ROLE_PATIENT};

use crate::models::{
    MedicalReport, Medicine, MedicineSpecialization, PrescribedMedicine, PrescribedMedicineView,
    PrescriptionDraft, ReportDetail, ReportDraft, ReportEditView, ReportError, SaveReportOutcome,
};
use crate::services::pdf::{self, ReportDocument};

pub struct ReportService {
    supabase: SupabaseClient,
    appointments: AppointmentBookingService,
    mailer: Arc<dyn Mailer>,
    reports_dir: PathBuf,
}

/// State needed to undo a save whose later steps failed.
enum Snapshot {
    Created(Uuid),
    Updated {
        previous: MedicalReport,
        medicines: Vec<PrescribedMedicine>,
    },
}

fn in_list(ids: impl IntoIterator<Item = Uuid>) -> String {
    let ids: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    format!("in.({})", ids.join(","))
}

impl ReportService {
    pub fn with_mailer(config: &AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            appointments: AppointmentBookingService::with_mailer(config, mailer.clone()),
            mailer,
            reports_dir: config.reports_dir.clone(),
        }
    }

    // ==========================================================================
    // MEDICINE CATALOGUE
    // ==========================================================================

    /// Medicines mapped to the doctor's specialization, or the whole
    /// catalogue when the doctor has none.
    pub async fn list_medicines(
        &self,
        doctor_id: &str,
        search: Option<&str>,
        auth_token: &str,
    ) -> Result<Vec<Medicine>, ReportError> {
        let doctor = self.supabase.get_user(doctor_id, Some(ROLE_DOCTOR), auth_token).await?;
        let specialization = doctor
            .and_then(|d| d.specialization)
            .filter(|s| !s.trim().is_empty());

        let mut path = "/rest/v1/medicines?order=name.asc".to_string();

        if let Some(specialization) = specialization {
            let mapping_path = format!(
                "/rest/v1/medicine_specializations?specialization=eq.{}&select=medicine_id",
                urlencoding::encode(&specialization)
            );
            let mapped: Vec<MedicineSpecialization> = self.supabase.fetch_all(&mapping_path, auth_token).await?;
            if mapped.is_empty() {
                debug!("No medicines mapped to {}", specialization);
                return Ok(Vec::new());
            }
            path.push_str(&format!("&id={}", in_list(mapped.into_iter().map(|m| m.medicine_id))));
        }

        if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
            path.push_str(&format!("&name=ilike.*{}*", urlencoding::encode(term)));
        }

        Ok(self.supabase.fetch_all(&path, auth_token).await?)
    }

    async fn medicines_by_id(
        &self,
        ids: &HashSet<Uuid>,
        auth_token: &str,
    ) -> anyhow::Result<HashMap<Uuid, Medicine>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let path = format!("/rest/v1/medicines?id={}", in_list(ids.iter().copied()));
        let medicines: Vec<Medicine> = self.supabase.fetch_all(&path, auth_token).await?;
        Ok(medicines.into_iter().map(|m| (m.id, m)).collect())
    }

    // ==========================================================================
    // LOOKUPS
    // ==========================================================================

    async fn doctor_appointment(
        &self,
        doctor_id: &str,
        appointment_id: &str,
        auth_token: &str,
    ) -> Result<Appointment, ReportError> {
        let appointment = self.appointments.get_appointment(appointment_id, auth_token).await?;
        if appointment.doctor_id.to_string() != doctor_id {
            return Err(ReportError::NotYourAppointment);
        }
        Ok(appointment)
    }

    async fn report_for_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> anyhow::Result<Option<MedicalReport>> {
        let path = format!("/rest/v1/medical_reports?appointment_id=eq.{}", appointment_id);
        self.supabase.fetch_one(&path, auth_token).await
    }

    async fn prescriptions(&self, report_id: Uuid, auth_token: &str) -> anyhow::Result<Vec<PrescribedMedicine>> {
        let path = format!("/rest/v1/prescribed_medicines?report_id=eq.{}", report_id);
        self.supabase.fetch_all(&path, auth_token).await
    }

    async fn detail(&self, report: MedicalReport, auth_token: &str) -> anyhow::Result<ReportDetail> {
        let prescriptions = self.prescriptions(report.id, auth_token).await?;
        let ids: HashSet<Uuid> = prescriptions.iter().map(|p| p.medicine_id).collect();
        let catalogue = self.medicines_by_id(&ids, auth_token).await?;
        Ok(ReportDetail {
            report,
            medicines: Self::views(prescriptions, &catalogue),
        })
    }

    fn views(prescriptions: Vec<PrescribedMedicine>, catalogue: &HashMap<Uuid, Medicine>) -> Vec<PrescribedMedicineView> {
        prescriptions
            .into_iter()
            .map(|prescription| PrescribedMedicineView {
                medicine_name: catalogue
                    .get(&prescription.medicine_id)
                    .map(|m| m.name.clone())
                    .unwrap_or_else(|| "Unknown medicine".to_string()),
                prescription,
            })
            .collect()
    }

    /// The appointment and, if one was saved before, its report.
    pub async fn get_report_for_edit(
        &self,
        doctor_id: &str,
        appointment_id: &str,
        auth_token: &str,
    ) -> Result<ReportEditView, ReportError> {
        let appointment = self.doctor_appointment(doctor_id, appointment_id, auth_token).await?;
        let report = match self.report_for_appointment(appointment.id, auth_token).await? {
            Some(report) => Some(self.detail(report, auth_token).await?),
            None => None,
        };
        Ok(ReportEditView { appointment, report })
    }

    pub async fn get_report(&self, user_id: &str, report_id: &str, auth_token: &str) -> Result<ReportDetail, ReportError> {
        let report = self.report_for_participant(user_id, report_id, auth_token).await?;
        Ok(self.detail(report, auth_token).await?)
    }

    async fn report_for_participant(
        &self,
        user_id: &str,
        report_id: &str,
        auth_token: &str,
    ) -> Result<MedicalReport, ReportError> {
        let path = format!("/rest/v1/medical_reports?id=eq.{}", report_id);
        let report: MedicalReport = self.supabase.fetch_one(&path, auth_token).await?
            .ok_or(ReportError::NotFound)?;
        if !report.is_participant(user_id) {
            return Err(ReportError::NotParticipant);
        }
        Ok(report)
    }

    /// Reports received by a patient, or written by a doctor; newest first.
    pub async fn list_reports(&self, user: &User, auth_token: &str) -> Result<Vec<MedicalReport>, ReportError> {
        let column = if user.is_doctor() { "doctor_id" } else { "patient_id" };
        let path = format!("/rest/v1/medical_reports?{}=eq.{}&order=created_at.desc", column, user.id);
        Ok(self.supabase.fetch_all(&path, auth_token).await?)
    }

    // ==========================================================================
    // SAVE
    // ==========================================================================

    /// Create or update the report of an appointment, replace its
    /// prescription and complete the appointment. A failure after the report
    /// row is written is undone before the error is returned. PDF and email
    /// run after that and only report their outcome.
    #[instrument(skip(self, draft, auth_token), fields(appointment_id = %draft.appointment_id))]
    pub async fn save_report(
        &self,
        doctor_id: &str,
        draft: ReportDraft,
        auth_token: &str,
    ) -> Result<SaveReportOutcome, ReportError> {
        let appointment = self
            .doctor_appointment(doctor_id, &draft.appointment_id.to_string(), auth_token)
            .await?;

        if appointment.status == AppointmentStatus::Canceled {
            return Err(ReportError::AppointmentCanceled);
        }
        if let Some(follow_up) = draft.follow_up_date {
            if follow_up < appointment.date {
                return Err(ReportError::ValidationError(
                    "Follow-up date cannot be before the appointment".to_string(),
                ));
            }
        }

        let medicine_ids: HashSet<Uuid> = draft.medicines.iter().map(|m| m.medicine_id).collect();
        let catalogue = self.medicines_by_id(&medicine_ids, auth_token).await?;
        if let Some(missing) = draft.medicines.iter().find(|m| !catalogue.contains_key(&m.medicine_id)) {
            return Err(ReportError::UnknownMedicine(missing.medicine_id));
        }

        let (report, snapshot) = match self.report_for_appointment(appointment.id, auth_token).await? {
            Some(previous) => {
                let medicines = self.prescriptions(previous.id, auth_token).await?;
                let report = self.update_report(&previous, &draft, auth_token).await?;
                (report, Snapshot::Updated { previous, medicines })
            }
            None => {
                let report = self.insert_report(&appointment, &draft, auth_token).await?;
                let id = report.id;
                (report, Snapshot::Created(id))
            }
        };
        let created = matches!(snapshot, Snapshot::Created(_));

        let prescriptions = match self.apply_prescription(&report, &appointment, &draft.medicines, auth_token).await {
            Ok(prescriptions) => prescriptions,
            Err(e) => {
                warn!("Saving report {} failed, rolling back: {}", report.id, e);
                self.roll_back(snapshot, auth_token).await;
                return Err(e);
            }
        };

        info!(
            "Doctor {} {} report {} for appointment {} ({} medicines)",
            doctor_id,
            if created { "created" } else { "updated" },
            report.id,
            appointment.id,
            prescriptions.len()
        );

        let detail = ReportDetail {
            report,
            medicines: Self::views(prescriptions, &catalogue),
        };

        let pdf_bytes = match self.render_and_store(&detail, &appointment, auth_token).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("PDF for report {} failed: {}", detail.report.id, e);
                None
            }
        };

        let email_sent = if draft.send_email {
            self.email_patient(&detail, &appointment, pdf_bytes.clone(), auth_token).await
        } else {
            false
        };

        Ok(SaveReportOutcome {
            report: detail,
            created,
            pdf_generated: pdf_bytes.is_some(),
            email_sent,
        })
    }

    fn report_fields(draft: &ReportDraft) -> Value {
        json!({
            "diagnosis": draft.diagnosis,
            "symptoms": draft.symptoms,
            "notes": draft.notes,
            "follow_up_date": draft.follow_up_date,
            "updated_at": Utc::now().to_rfc3339(),
        })
    }

    async fn insert_report(
        &self,
        appointment: &Appointment,
        draft: &ReportDraft,
        auth_token: &str,
    ) -> Result<MedicalReport, ReportError> {
        let mut body = Self::report_fields(draft);
        body["appointment_id"] = json!(appointment.id);
        body["doctor_id"] = json!(appointment.doctor_id);
        body["patient_id"] = json!(appointment.patient_id);
        body["created_at"] = json!(Utc::now().to_rfc3339());

        let rows: Vec<MedicalReport> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/medical_reports",
            Some(auth_token),
            Some(body),
            Some(return_representation()),
        ).await?;

        rows.into_iter().next()
            .ok_or_else(|| ReportError::DatabaseError("Insert returned no report row".to_string()))
    }

    async fn update_report(
        &self,
        previous: &MedicalReport,
        draft: &ReportDraft,
        auth_token: &str,
    ) -> Result<MedicalReport, ReportError> {
        let path = format!("/rest/v1/medical_reports?id=eq.{}", previous.id);
        let rows: Vec<MedicalReport> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Self::report_fields(draft)),
            Some(return_representation()),
        ).await?;

        rows.into_iter().next().ok_or(ReportError::NotFound)
    }

    /// Replace the prescription lines and complete the appointment.
    async fn apply_prescription(
        &self,
        report: &MedicalReport,
        appointment: &Appointment,
        medicines: &[PrescriptionDraft],
        auth_token: &str,
    ) -> Result<Vec<PrescribedMedicine>, ReportError> {
        let delete_path = format!("/rest/v1/prescribed_medicines?report_id=eq.{}", report.id);
        self.supabase.execute(Method::DELETE, &delete_path, Some(auth_token), None).await?;

        let inserted = if medicines.is_empty() {
            Vec::new()
        } else {
            let rows: Vec<Value> = medicines
                .iter()
                .map(|m| json!({
                    "report_id": report.id,
                    "medicine_id": m.medicine_id,
                    "dosage": m.dosage,
                    "frequency": m.frequency,
                    "duration_days": m.duration_days,
                    "instructions": m.instructions,
                }))
                .collect();

            self.supabase.request_with_headers::<Vec<PrescribedMedicine>>(
                Method::POST,
                "/rest/v1/prescribed_medicines",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(return_representation()),
            ).await?
        };

        if appointment.status == AppointmentStatus::Scheduled {
            self.appointments
                .transition(appointment, AppointmentStatus::Completed, None, auth_token)
                .await?;
        }

        Ok(inserted)
    }

    /// Undo the report write. Failures here are logged; the caller already
    /// returns the original error.
    async fn roll_back(&self, snapshot: Snapshot, auth_token: &str) {
        match snapshot {
            Snapshot::Created(report_id) => {
                let lines = format!("/rest/v1/prescribed_medicines?report_id=eq.{}", report_id);
                let report = format!("/rest/v1/medical_reports?id=eq.{}", report_id);
                for path in [lines, report] {
                    if let Err(e) = self.supabase.execute(Method::DELETE, &path, Some(auth_token), None).await {
                        error!("Rollback of report {} incomplete ({}): {}", report_id, path, e);
                    }
                }
            }
            Snapshot::Updated { previous, medicines } => {
                let report_path = format!("/rest/v1/medical_reports?id=eq.{}", previous.id);
                let restore_report = self.supabase.execute(
                    Method::PATCH,
                    &report_path,
                    Some(auth_token),
                    Some(json!({
                        "diagnosis": previous.diagnosis,
                        "symptoms": previous.symptoms,
                        "notes": previous.notes,
                        "follow_up_date": previous.follow_up_date,
                        "updated_at": previous.updated_at,
                    })),
                ).await;
                if let Err(e) = restore_report {
                    error!("Could not restore report {}: {}", previous.id, e);
                }

                let lines_path = format!("/rest/v1/prescribed_medicines?report_id=eq.{}", previous.id);
                if let Err(e) = self.supabase.execute(Method::DELETE, &lines_path, Some(auth_token), None).await {
                    error!("Could not clear prescription of report {}: {}", previous.id, e);
                    return;
                }
                if medicines.is_empty() {
                    return;
                }
                let rows = serde_json::to_value(&medicines).unwrap_or(Value::Null);
                if let Err(e) = self.supabase.execute(
                    Method::POST,
                    "/rest/v1/prescribed_medicines",
                    Some(auth_token),
                    Some(rows),
                ).await {
                    error!("Could not restore prescription of report {}: {}", previous.id, e);
                }
            }
        }
    }

    // ==========================================================================
    // PDF AND EMAIL
    // ==========================================================================

    async fn render_and_store(
        &self,
        detail: &ReportDetail,
        appointment: &Appointment,
        auth_token: &str,
    ) -> anyhow::Result<Vec<u8>> {
        let doctor = self.supabase
            .get_user(&detail.report.doctor_id.to_string(), Some(ROLE_DOCTOR), auth_token).await?;
        let patient = self.supabase
            .get_user(&detail.report.patient_id.to_string(), Some(ROLE_PATIENT), auth_token).await?;

        let bytes = pdf::render_report_pdf(&ReportDocument {
            report: &detail.report,
            medicines: &detail.medicines,
            doctor_name: doctor.as_ref().map(|d| d.full_name.as_str()).unwrap_or("Unknown"),
            doctor_specialization: doctor.as_ref().and_then(|d| d.specialization.as_deref()),
            patient_name: patient.as_ref().map(|p| p.full_name.as_str()).unwrap_or("Unknown"),
            appointment_date: appointment.date,
            appointment_time: appointment.time,
        })?;

        let path = pdf::write_report_pdf(&self.reports_dir, &detail.report, &bytes).await?;
        debug!("Stored {}", path.display());
        Ok(bytes)
    }

    async fn email_patient(
        &self,
        detail: &ReportDetail,
        appointment: &Appointment,
        pdf_bytes: Option<Vec<u8>>,
        auth_token: &str,
    ) -> bool {
        let patient = self.supabase
            .get_user(&detail.report.patient_id.to_string(), Some(ROLE_PATIENT), auth_token).await;
        let doctor = self.supabase
            .get_user(&detail.report.doctor_id.to_string(), Some(ROLE_DOCTOR), auth_token).await;

        let (patient, doctor) = match (patient, doctor) {
            (Ok(Some(patient)), Ok(Some(doctor))) => (patient, doctor),
            _ => {
                warn!("Could not load participants of report {}, skipping email", detail.report.id);
                return false;
            }
        };

        let email = templates::report_ready_email(
            templates::Recipient { email: &patient.email, name: &patient.full_name },
            &doctor.full_name,
            appointment.date,
            &detail.report.diagnosis,
            pdf_bytes.map(|bytes| EmailAttachment::pdf(detail.report.pdf_filename(), bytes)),
        );

        match self.mailer.send(email).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Report email for {} failed: {}", detail.report.id, e);
                false
            }
        }
    }

    /// The stored PDF of a report, rendered again when the file is missing.
    pub async fn report_pdf(
        &self,
        user_id: &str,
        report_id: &str,
        auth_token: &str,
    ) -> Result<(String, Vec<u8>), ReportError> {
        let report = self.report_for_participant(user_id, report_id, auth_token).await?;
        let filename = report.pdf_filename();
        let path = pdf::report_pdf_path(&self.reports_dir, &report);

        match tokio::fs::read(&path).await {
            Ok(bytes) => return Ok((filename, bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} missing, rendering again", path.display());
            }
            Err(e) => return Err(ReportError::PdfError(e.to_string())),
        }

        let appointment = self.appointments
            .get_appointment(&report.appointment_id.to_string(), auth_token)
            .await?;
        let detail = self.detail(report, auth_token).await?;
        let bytes = self
            .render_and_store(&detail, &appointment, auth_token)
            .await
            .map_err(|e| ReportError::PdfError(e.to_string()))?;

        Ok((filename, bytes))
    }
}
