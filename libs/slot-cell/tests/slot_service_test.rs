// libs/slot-cell/tests/slot_service_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Local, NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::MockMailer;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};
use slot_cell::{SlotError, SlotService, SlotWindow};

const TOKEN: &str = "doctor-token";

fn future_date() -> NaiveDate {
    Local::now().date_naive() + Duration::days(7)
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn service(server: &MockServer, mailer: MockMailer) -> SlotService {
    let config = TestConfig::with_supabase_url(server.uri()).to_app_config();
    SlotService::with_mailer(&config, Arc::new(mailer))
}

async fn mount_lock(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_create_slots_skips_existing_times() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();
    let date = future_date();
    let date_str = date.to_string();

    mount_lock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("date", format!("eq.{}", date_str)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor_id, &date_str, "09:30:00")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor_id, &date_str, "09:00:00"),
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor_id, &date_str, "10:00:00"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let window = SlotWindow { date, start_time: t(9, 0), end_time: t(10, 30) };
    let result = service(&mock_server, MockMailer::new())
        .create_slots(&doctor_id, window, TOKEN)
        .await
        .unwrap();

    assert_eq!(result.created.len(), 2);
    assert_eq!(result.skipped, vec![t(9, 30)]);
    assert_eq!(result.created[0].time, t(9, 0));
}

#[tokio::test]
async fn test_create_slots_all_duplicates_inserts_nothing() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();
    let date = future_date();
    let date_str = date.to_string();

    mount_lock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor_id, &date_str, "14:00:00")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let window = SlotWindow { date, start_time: t(14, 0), end_time: t(14, 30) };
    let result = service(&mock_server, MockMailer::new())
        .create_slots(&doctor_id, window, TOKEN)
        .await
        .unwrap();

    assert!(result.created.is_empty());
    assert_eq!(result.skipped, vec![t(14, 0)]);
}

#[tokio::test]
async fn test_create_slots_rejects_past_date_and_inverted_window() {
    let mock_server = MockServer::start().await;
    let svc = service(&mock_server, MockMailer::new());
    let doctor_id = Uuid::new_v4().to_string();

    let past = SlotWindow {
        date: Local::now().date_naive() - Duration::days(1),
        start_time: t(9, 0),
        end_time: t(10, 0),
    };
    assert_matches!(
        svc.create_slots(&doctor_id, past, TOKEN).await,
        Err(SlotError::ValidationError(msg)) if msg.contains("past")
    );

    let inverted = SlotWindow { date: future_date(), start_time: t(12, 0), end_time: t(9, 0) };
    assert_matches!(
        svc.create_slots(&doctor_id, inverted, TOKEN).await,
        Err(SlotError::ValidationError(_))
    );

    let too_short = SlotWindow { date: future_date(), start_time: t(9, 0), end_time: t(9, 15) };
    assert_matches!(
        svc.create_slots(&doctor_id, too_short, TOKEN).await,
        Err(SlotError::ValidationError(msg)) if msg.contains("No 30-minute slot")
    );
}

#[tokio::test]
async fn test_delete_slot_cancels_booking_and_notifies_patient() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();
    let slot_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();
    let date_str = future_date().to_string();

    mount_lock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&slot_id, &doctor_id, &date_str, "11:00:00")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("time", "eq.11:00:00"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(&appointment_id, &doctor_id, &patient_id, &date_str, "11:00:00", "scheduled")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({
            "status": "canceled",
            "cancellation_reason": "Doctor removed this slot"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::user_row(&patient_id, "patient", "Pat Smith")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::user_row(&doctor_id, "doctor", "Gregory House")
        ])))
        .mount(&mock_server)
        .await;

    let mut mailer = MockMailer::new();
    mailer
        .expect_send()
        .withf(|email| email.to == "patient@example.com" && email.text_body.contains("Gregory House"))
        .times(1)
        .returning(|_| Ok(()));

    let result = service(&mock_server, mailer)
        .delete_slot(&doctor_id, &slot_id, TOKEN)
        .await
        .unwrap();

    assert_eq!(result.slot_id.to_string(), slot_id);
    assert_eq!(result.canceled_appointment_id.map(|id| id.to_string()), Some(appointment_id));
    assert!(result.notification_sent);
}

#[tokio::test]
async fn test_delete_slot_failure_restores_appointment() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();
    let slot_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();
    let date_str = future_date().to_string();

    mount_lock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&slot_id, &doctor_id, &date_str, "11:00:00")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(&appointment_id, &doctor_id, &patient_id, &date_str, "11:00:00", "scheduled")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "canceled" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "scheduled" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("statement timeout", "57014")
        ))
        .mount(&mock_server)
        .await;

    let mut mailer = MockMailer::new();
    mailer.expect_send().times(0);

    let result = service(&mock_server, mailer)
        .delete_slot(&doctor_id, &slot_id, TOKEN)
        .await;

    assert_matches!(result, Err(SlotError::DatabaseError(_)));
}

#[tokio::test]
async fn test_delete_slot_succeeds_when_mail_fails() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();
    let slot_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();
    let date_str = future_date().to_string();

    mount_lock(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&slot_id, &doctor_id, &date_str, "11:00:00")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(&appointment_id, &doctor_id, &patient_id, &date_str, "11:00:00", "scheduled")
        ])))
        .mount(&mock_server)
        .await;

    // Only the cancellation; the appointment must not be restored.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "canceled" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "scheduled" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::user_row(&patient_id, "patient", "Pat Smith")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::user_row(&doctor_id, "doctor", "Gregory House")
        ])))
        .mount(&mock_server)
        .await;

    let mut mailer = MockMailer::new();
    mailer
        .expect_send()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("smtp relay refused connection")));

    let result = service(&mock_server, mailer)
        .delete_slot(&doctor_id, &slot_id, TOKEN)
        .await
        .unwrap();

    assert_eq!(result.canceled_appointment_id.map(|id| id.to_string()), Some(appointment_id));
    assert!(!result.notification_sent);
}

#[tokio::test]
async fn test_delete_slot_of_another_doctor_is_rejected() {
    let mock_server = MockServer::start().await;
    let owner_id = Uuid::new_v4().to_string();
    let slot_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&slot_id, &owner_id, &future_date().to_string(), "11:00:00")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = service(&mock_server, MockMailer::new())
        .delete_slot(&Uuid::new_v4().to_string(), &slot_id, TOKEN)
        .await;

    assert_matches!(result, Err(SlotError::NotOwner));
}

#[tokio::test]
async fn test_delete_missing_slot_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = service(&mock_server, MockMailer::new())
        .delete_slot(&Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), TOKEN)
        .await;

    assert_matches!(result, Err(SlotError::NotFound));
}

#[tokio::test]
async fn test_available_slots_exclude_booked_times() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();
    let date_str = future_date().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor_id, &date_str, "09:00:00"),
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor_id, &date_str, "09:30:00"),
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor_id, &date_str, "10:00:00"),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(), &doctor_id, &Uuid::new_v4().to_string(),
                &date_str, "09:30:00", "scheduled"
            )
        ])))
        .mount(&mock_server)
        .await;

    let slots = service(&mock_server, MockMailer::new())
        .list_available_slots(&doctor_id, future_date(), TOKEN)
        .await
        .unwrap();

    let times: Vec<NaiveTime> = slots.iter().map(|s| s.time).collect();
    assert_eq!(times, vec![t(9, 0), t(10, 0)]);
}

#[tokio::test]
async fn test_doctor_slots_flag_booked_entries() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();
    let date_str = future_date().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor_id, &date_str, "09:00:00"),
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor_id, &date_str, "09:30:00"),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(), &doctor_id, &Uuid::new_v4().to_string(),
                &date_str, "09:00:00", "scheduled"
            )
        ])))
        .mount(&mock_server)
        .await;

    let slots = service(&mock_server, MockMailer::new())
        .list_doctor_slots(&doctor_id, Local::now().date_naive(), TOKEN)
        .await
        .unwrap();

    assert_eq!(slots.len(), 2);
    assert!(slots[0].is_booked);
    assert!(!slots[1].is_booked);
}
