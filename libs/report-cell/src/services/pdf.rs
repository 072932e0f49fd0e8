// libs/report-cell/src/services/pdf.rs
//
// A4 rendering of a medical report with the builtin Helvetica faces.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveTime};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use tracing::debug;

use crate::models::{MedicalReport, PrescribedMedicineView};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const BODY_SIZE: f32 = 11.0;
const TABLE_SIZE: f32 = 9.0;
const WRAP_CHARS: usize = 95;

/// (header, x offset in mm, max characters)
const MEDICINE_COLUMNS: [(&str, f32, usize); 5] = [
    ("Medicine", 20.0, 26),
    ("Dosage", 72.0, 14),
    ("Frequency", 101.0, 16),
    ("Duration", 134.0, 10),
    ("Instructions", 154.0, 26),
];

pub struct ReportDocument<'a> {
    pub report: &'a MedicalReport,
    pub medicines: &'a [PrescribedMedicineView],
    pub doctor_name: &'a str,
    pub doctor_specialization: Option<&'a str>,
    pub patient_name: &'a str,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
}

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow!("font error: {:?}", e))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow!("font error: {:?}", e))?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_HEIGHT - MARGIN,
        })
    }

    fn line_height(size: f32) -> f32 {
        size * 0.55
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        self.ensure_space(Self::line_height(size));
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(MARGIN), Mm(self.y), font);
        self.y -= Self::line_height(size);
    }

    fn columns(&mut self, cells: &[String], bold: bool) {
        self.ensure_space(Self::line_height(TABLE_SIZE));
        let font = if bold { &self.bold } else { &self.regular };
        for (cell, (_, x, _)) in cells.iter().zip(MEDICINE_COLUMNS.iter()) {
            self.layer.use_text(cell.as_str(), TABLE_SIZE, Mm(*x), Mm(self.y), font);
        }
        self.y -= Self::line_height(TABLE_SIZE);
    }

    fn section(&mut self, heading: &str, body: &str) {
        self.gap(2.0);
        self.line(heading, BODY_SIZE, true);
        for line in wrap_text(body, WRAP_CHARS) {
            self.line(&line, BODY_SIZE, false);
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn finish(self) -> Result<Vec<u8>> {
        let PageWriter { doc, layer, .. } = self;
        drop(layer);
        doc.save_to_bytes().map_err(|e| anyhow!("could not serialize PDF: {:?}", e))
    }
}

/// Render the report as a PDF document.
pub fn render_report_pdf(document: &ReportDocument<'_>) -> Result<Vec<u8>> {
    let report = document.report;
    let mut writer = PageWriter::new(&format!("Medical report {}", report.id))?;

    writer.line("MediVerse Medical Report", 18.0, true);
    writer.gap(4.0);

    let doctor = match document.doctor_specialization {
        Some(specialization) if !specialization.is_empty() => {
            format!("Doctor: Dr. {} ({})", document.doctor_name, specialization)
        }
        _ => format!("Doctor: Dr. {}", document.doctor_name),
    };
    writer.line(&doctor, BODY_SIZE, false);
    writer.line(&format!("Patient: {}", document.patient_name), BODY_SIZE, false);
    writer.line(
        &format!(
            "Appointment: {} at {}",
            document.appointment_date.format("%d %B %Y"),
            document.appointment_time.format("%H:%M")
        ),
        BODY_SIZE,
        false,
    );
    writer.line(
        &format!("Report date: {}", report.updated_at.unwrap_or(report.created_at).format("%d %B %Y")),
        BODY_SIZE,
        false,
    );

    writer.section("Diagnosis", &report.diagnosis);
    if let Some(symptoms) = report.symptoms.as_deref().filter(|s| !s.is_empty()) {
        writer.section("Symptoms", symptoms);
    }
    if let Some(notes) = report.notes.as_deref().filter(|s| !s.is_empty()) {
        writer.section("Notes", notes);
    }
    if let Some(follow_up) = report.follow_up_date {
        writer.section("Follow-up", &follow_up.format("%d %B %Y").to_string());
    }

    writer.gap(2.0);
    writer.line("Prescribed medicines", BODY_SIZE, true);
    if document.medicines.is_empty() {
        writer.line("None", BODY_SIZE, false);
    } else {
        let headers: Vec<String> = MEDICINE_COLUMNS.iter().map(|(h, _, _)| h.to_string()).collect();
        writer.columns(&headers, true);

        for medicine in document.medicines {
            let p = &medicine.prescription;
            let values = [
                medicine.medicine_name.clone(),
                p.dosage.clone(),
                p.frequency.clone(),
                format!("{} day{}", p.duration_days, if p.duration_days == 1 { "" } else { "s" }),
                p.instructions.clone().unwrap_or_default(),
            ];
            let cells: Vec<String> = values
                .iter()
                .zip(MEDICINE_COLUMNS.iter())
                .map(|(value, (_, _, max))| truncate(value, *max))
                .collect();
            writer.columns(&cells, false);
        }
    }

    let bytes = writer.finish()?;
    debug!("Rendered report {} PDF ({} bytes)", report.id, bytes.len());
    Ok(bytes)
}

pub fn report_pdf_path(dir: &Path, report: &MedicalReport) -> PathBuf {
    dir.join(report.pdf_filename())
}

/// Store rendered bytes as `report_<id>.pdf` under `dir`.
pub async fn write_report_pdf(dir: &Path, report: &MedicalReport, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = report_pdf_path(dir, report);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Greedy word wrap on character counts; words longer than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                lines.push(word.drain(..width).collect());
            }
            let word: String = word.into_iter().collect();
            if word.is_empty() {
                continue;
            }

            let needed = if current.is_empty() { word.chars().count() } else { current.chars().count() + 1 + word.chars().count() };
            if needed > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let kept: String = value.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
