use chrono::{NaiveDate, NaiveTime};

use crate::models::{EmailAttachment, EmailMessage};

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn format_slot(date: NaiveDate, time: NaiveTime) -> String {
    format!("{} at {}", date.format("%A, %d %B %Y"), time.format("%H:%M"))
}

fn wrap_html(title: &str, body: &str) -> String {
    format!(
        "<html><body style=\"font-family: Arial, sans-serif; color: #222;\">\
         <h2 style=\"color: #0d6efd;\">{}</h2>{}\
         <p style=\"color: #888; font-size: 12px;\">MediVerse telehealth portal</p>\
         </body></html>",
        escape_html(title),
        body
    )
}

pub struct Recipient<'a> {
    pub email: &'a str,
    pub name: &'a str,
}

/// Sent to the patient when their appointment is canceled, either directly
/// or because the doctor removed the slot it was booked on.
pub fn appointment_canceled_email(
    patient: Recipient<'_>,
    doctor_name: &str,
    date: NaiveDate,
    time: NaiveTime,
    reason: &str,
) -> EmailMessage {
    let when = format_slot(date, time);
    let subject = format!("Appointment canceled: {}", when);

    let text_body = format!(
        "Dear {},\n\nYour appointment with Dr. {} on {} has been canceled.\nReason: {}\n\n\
         Please log in to MediVerse to book another slot.\n",
        patient.name, doctor_name, when, reason
    );

    let html_body = wrap_html(
        "Appointment canceled",
        &format!(
            "<p>Dear {},</p><p>Your appointment with <strong>Dr. {}</strong> on \
             <strong>{}</strong> has been canceled.</p><p>Reason: {}</p>\
             <p>Please log in to MediVerse to book another slot.</p>",
            escape_html(patient.name),
            escape_html(doctor_name),
            escape_html(&when),
            escape_html(reason)
        ),
    );

    EmailMessage {
        to: patient.email.to_string(),
        to_name: Some(patient.name.to_string()),
        subject,
        text_body,
        html_body,
        attachment: None,
    }
}

/// Sent to the patient once the doctor saves a medical report. The PDF is
/// attached when it could be rendered.
pub fn report_ready_email(
    patient: Recipient<'_>,
    doctor_name: &str,
    appointment_date: NaiveDate,
    diagnosis: &str,
    pdf: Option<EmailAttachment>,
) -> EmailMessage {
    let date = appointment_date.format("%d %B %Y").to_string();
    let subject = format!("Your medical report from Dr. {}", doctor_name);
    let attachment_note = if pdf.is_some() {
        "The full report is attached as a PDF."
    } else {
        "You can view the full report in your MediVerse account."
    };

    let text_body = format!(
        "Dear {},\n\nDr. {} has completed the medical report for your appointment on {}.\n\
         Diagnosis: {}\n\n{}\n",
        patient.name, doctor_name, date, diagnosis, attachment_note
    );

    let html_body = wrap_html(
        "Your medical report is ready",
        &format!(
            "<p>Dear {},</p><p><strong>Dr. {}</strong> has completed the medical report for your \
             appointment on <strong>{}</strong>.</p><p>Diagnosis: {}</p><p>{}</p>",
            escape_html(patient.name),
            escape_html(doctor_name),
            escape_html(&date),
            escape_html(diagnosis),
            attachment_note
        ),
    );

    EmailMessage {
        to: patient.email.to_string(),
        to_name: Some(patient.name.to_string()),
        subject,
        text_body,
        html_body,
        attachment: pdf,
    }
}
