// Request parameter checks shared by every cell.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::profile::UpdateProfileRequest;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern compiles")
});

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):[0-5]\d(:[0-5]\d)?$").expect("time pattern compiles")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern compiles")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[0-9][0-9 \-]{6,19}$").expect("phone pattern compiles")
});

/// `YYYY-MM-DD`
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    let value = value.trim();
    if !DATE_RE.is_match(value) {
        return Err(AppError::ValidationError(format!("{} must be in YYYY-MM-DD format", field)));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::ValidationError(format!("{} is not a valid calendar date", field)))
}

/// `HH:MM` or `HH:MM:SS`, 24-hour clock.
pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime, AppError> {
    let value = value.trim();
    if !TIME_RE.is_match(value) {
        return Err(AppError::ValidationError(format!("{} must be in HH:MM format", field)));
    }
    let format = if value.len() == 5 { "%H:%M" } else { "%H:%M:%S" };
    NaiveTime::parse_from_str(value, format)
        .map_err(|_| AppError::ValidationError(format!("{} is not a valid time", field)))
}

pub fn validate_email(email: &str) -> bool {
    EMAIL_RE.is_match(email) && email.len() <= 254
}

pub fn validate_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// Trims `value` and rejects it when empty or longer than `max_len` characters.
pub fn require_non_empty(field: &str, value: &str, max_len: usize) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max_len {
        return Err(AppError::ValidationError(format!(
            "{} must be at most {} characters", field, max_len
        )));
    }
    Ok(trimmed.to_string())
}

/// Same as [`require_non_empty`] but lets an absent or blank value through as `None`.
pub fn optional_text(field: &str, value: Option<&str>, max_len: usize) -> Result<Option<String>, AppError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => require_non_empty(field, v, max_len).map(Some),
    }
}

pub fn parse_uuid(field: &str, value: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| AppError::ValidationError(format!("{} is not a valid identifier", field)))
}

/// Turn a profile update into the PATCH body for `users`. Doctor-only
/// fields are refused on patient profiles.
pub fn profile_changes(request: &UpdateProfileRequest, is_doctor: bool) -> Result<Map<String, Value>, AppError> {
    let mut changes = Map::new();

    if let Some(name) = &request.full_name {
        changes.insert("full_name".to_string(), json!(require_non_empty("full_name", name, 120)?));
    }
    if let Some(email) = &request.email {
        let email = email.trim();
        if !validate_email(email) {
            return Err(AppError::ValidationError("email is not a valid address".to_string()));
        }
        changes.insert("email".to_string(), json!(email.to_lowercase()));
    }
    if let Some(phone) = &request.phone {
        let phone = optional_text("phone", Some(phone), 20)?;
        if let Some(p) = &phone {
            if !validate_phone(p) {
                return Err(AppError::ValidationError("phone is not a valid phone number".to_string()));
            }
        }
        changes.insert("phone".to_string(), json!(phone));
    }
    if let Some(dob) = &request.date_of_birth {
        let dob = match dob.trim() {
            "" => None,
            value => {
                let date = parse_date("date_of_birth", value)?;
                if date > Utc::now().date_naive() {
                    return Err(AppError::ValidationError("date_of_birth cannot be in the future".to_string()));
                }
                Some(date)
            }
        };
        changes.insert("date_of_birth".to_string(), json!(dob));
    }
    for (field, value, max_len) in [
        ("gender", &request.gender, 20),
        ("address", &request.address, 300),
        ("bio", &request.bio, 2000),
    ] {
        if let Some(v) = value {
            changes.insert(field.to_string(), json!(optional_text(field, Some(v), max_len)?));
        }
    }

    let doctor_fields = [
        ("specialization", &request.specialization),
        ("qualification", &request.qualification),
    ];
    if !is_doctor && (request.experience_years.is_some() || doctor_fields.iter().any(|(_, v)| v.is_some())) {
        return Err(AppError::ValidationError(
            "specialization, qualification and experience_years only apply to doctors".to_string(),
        ));
    }
    for (field, value) in doctor_fields {
        if let Some(v) = value {
            changes.insert(field.to_string(), json!(optional_text(field, Some(v), 120)?));
        }
    }
    if let Some(years) = request.experience_years {
        if !(0..=70).contains(&years) {
            return Err(AppError::ValidationError("experience_years must be between 0 and 70".to_string()));
        }
        changes.insert("experience_years".to_string(), json!(years));
    }

    if changes.is_empty() {
        return Err(AppError::ValidationError("No profile fields to update".to_string()));
    }
    changes.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
    Ok(changes)
}
