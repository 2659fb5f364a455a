//! services/api/tests/rest_test.rs
//!
//! Drives the full router in-process against in-memory storage and a fixed clock.

use api_lib::{
    config::{Config, StorageBackend},
    web::{self, middleware::ADMIN_TOKEN_HEADER, state::AppState},
};
use attendance_core::{CheckInLink, FixedClock, InMemoryRepository, Slot, WeeklySchedule};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, Weekday};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;

const ROSTER: &str = "class-a";

fn app_with(admin_token: Option<&str>, schedule: WeeklySchedule) -> Router {
    let config = Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        storage: StorageBackend::Memory,
        log_level: tracing::Level::INFO,
        admin_token: admin_token.map(str::to_string),
        checkin_base_url: Url::parse("https://attend.example/app/").unwrap(),
        schedule,
    };
    let state = AppState {
        repo: Arc::new(InMemoryRepository::new()),
        config: Arc::new(config),
        // A Monday.
        clock: Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())),
    };
    web::router(Arc::new(state))
}

fn app() -> Router {
    app_with(None, WeeklySchedule::every_day())
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

async fn add_member(app: &Router, name: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        &format!("/rosters/{ROSTER}/members"),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn members_are_listed_by_name_and_duplicates_conflict() {
    let app = app();
    add_member(&app, "이영희").await;
    add_member(&app, "김민수").await;

    let (status, body) = call(&app, "GET", &format!("/rosters/{ROSTER}/members"), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["김민수", "이영희"]);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/members"),
        Some(json!({ "name": " 김민수 " })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/members"),
        Some(json!({ "name": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ingest_marks_members_present() {
    let app = app();
    let kim = add_member(&app, "김민수").await;
    let lee = add_member(&app, "이영희").await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/sessions/2024-03-04/morning/ingest"),
        Some(json!({ "text": "김민수 이영희 출석" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "2024-03-04_오전");
    assert_eq!(body["registered"].as_array().unwrap().len(), 0);
    assert_eq!(body["newly_present"], 2);
    assert_eq!(body["present_total"], 2);

    let (status, body) = call(
        &app,
        "GET",
        &format!("/rosters/{ROSTER}/sessions/2024-03-04/morning"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let present: Vec<&str> = body["present_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|id| id.as_str().unwrap())
        .collect();
    assert_eq!(present.len(), 2);
    assert!(present.contains(&kim.as_str()));
    assert!(present.contains(&lee.as_str()));

    let (status, _) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/sessions/2024-03-04/morning/ingest"),
        Some(json!({ "text": "  \n " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_session_keys_are_rejected() {
    let app = app();
    let (status, _) = call(
        &app,
        "GET",
        &format!("/rosters/{ROSTER}/sessions/2024-03-04/night"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "GET",
        &format!("/rosters/{ROSTER}/sessions/2024-13-40/morning"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn toggle_and_reset_session() {
    let app = app();
    let kim = add_member(&app, "김민수").await;
    let toggle = format!("/rosters/{ROSTER}/sessions/2024-03-05/evening/toggle");

    let (status, body) = call(&app, "POST", &toggle, Some(json!({ "member_id": kim }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["present"], true);

    let (_, body) = call(&app, "POST", &toggle, Some(json!({ "member_id": kim }))).await;
    assert_eq!(body["present"], false);

    let stranger = uuid::Uuid::new_v4();
    let (status, _) = call(&app, "POST", &toggle, Some(json!({ "member_id": stranger }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    call(&app, "POST", &toggle, Some(json!({ "member_id": kim }))).await;
    let reset = format!("/rosters/{ROSTER}/sessions/2024-03-05/evening/reset");
    let (status, body) = call(&app, "POST", &reset, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);

    let (_, body) = call(&app, "POST", &reset, None).await;
    assert_eq!(body["cleared"], 0);
}

#[tokio::test]
async fn member_with_attendance_cannot_be_removed_until_reset() {
    let app = app();
    let kim = add_member(&app, "김민수").await;
    call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/sessions/2024-03-04/morning/toggle"),
        Some(json!({ "member_id": kim })),
    )
    .await;

    let member_uri = format!("/rosters/{ROSTER}/members/{kim}");
    let (status, _) = call(&app, "DELETE", &member_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/sessions/2024-03-04/morning/reset"),
        None,
    )
    .await;
    let (status, body) = call(&app, "DELETE", &member_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "김민수");

    let (status, _) = call(&app, "DELETE", &member_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn self_check_in_prompts_for_cancellation() {
    let app = app();
    let kim = add_member(&app, "김민수").await;
    let request = json!({ "member_id": kim, "slot": "오전" });

    let (status, body) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/checkin"),
        Some(request.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "checked_in");
    assert_eq!(body["session_id"], "2024-03-04_오전");

    let (_, body) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/checkin"),
        Some(request.clone()),
    )
    .await;
    assert_eq!(body["status"], "already_present");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/checkin/cancel"),
        Some(request),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);

    let (_, body) = call(
        &app,
        "GET",
        &format!("/rosters/{ROSTER}/sessions/2024-03-04/morning"),
        None,
    )
    .await;
    assert!(body["present_ids"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn self_registration_checks_the_newcomer_in() {
    let app = app();
    let (status, body) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/checkin/register"),
        Some(json!({ "name": "박지성", "slot": "오후" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "checked_in");
    assert_eq!(body["member"]["name"], "박지성");
    assert_eq!(body["session_id"], "2024-03-04_오후");

    let (status, _) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/checkin/register"),
        Some(json!({ "name": "박", "slot": "오후" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/checkin/register"),
        Some(json!({ "name": "박지성", "slot": "오후" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn check_in_outside_the_schedule_is_rejected() {
    let app = app_with(None, "mon=오전".parse().unwrap());
    let kim = add_member(&app, "김민수").await;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/checkin"),
        Some(json!({ "member_id": kim, "slot": "오후" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/checkin"),
        Some(json!({ "member_id": kim, "slot": "오전" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_require_the_configured_token() {
    let app = app_with(Some("secret"), WeeklySchedule::every_day());
    let uri = format!("/rosters/{ROSTER}/members");

    let (status, _) = call(&app, "POST", &uri, Some(json!({ "name": "김민수" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri(&uri)
        .header("content-type", "application/json")
        .header(ADMIN_TOKEN_HEADER, "secret")
        .body(Body::from(json!({ "name": "김민수" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Reading the roster stays public.
    let (status, body) = call(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn monthly_report_counts_sessions_and_rates() {
    let app = app();
    add_member(&app, "김민수").await;
    add_member(&app, "이영희").await;
    for (date, slot) in [("2024-03-04", "morning"), ("2024-03-05", "afternoon")] {
        call(
            &app,
            "POST",
            &format!("/rosters/{ROSTER}/sessions/{date}/{slot}/ingest"),
            Some(json!({ "text": "김민수" })),
        )
        .await;
    }
    call(
        &app,
        "POST",
        &format!("/rosters/{ROSTER}/sessions/2024-04-01/morning/ingest"),
        Some(json!({ "text": "이영희" })),
    )
    .await;

    let (status, body) = call(&app, "GET", &format!("/rosters/{ROSTER}/reports/2024-03"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["month"], "2024-03");
    assert_eq!(body["session_count"], 2);
    assert_eq!(body["members"][0]["name"], "김민수");
    assert_eq!(body["members"][0]["rate"], 100);
    assert_eq!(body["members"][1]["rate"], 0);
    assert_eq!(body["summary"]["slots"]["오전"], 1);
    assert_eq!(body["summary"]["slots"]["오후"], 1);
    assert_eq!(body["summary"]["total"], 2);
    assert_eq!(body["daily"][0]["date"], "2024-03-05");

    let (status, _) = call(&app, "GET", &format!("/rosters/{ROSTER}/reports/2024-3"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn links_follow_the_schedule_and_resolve_back() {
    let app = app_with(None, "wed=오후,저녁;mon=오전".parse().unwrap());
    let (status, body) = call(&app, "GET", &format!("/rosters/{ROSTER}/links"), None).await;
    assert_eq!(status, StatusCode::OK);

    let links = body.as_array().unwrap();
    assert_eq!(links.len(), 3);
    assert_eq!(links[0]["day"], "월요일");
    assert_eq!(links[0]["slot"], "오전");
    assert_eq!(links[2]["slot"], "저녁");

    let url = Url::parse(links[0]["url"].as_str().unwrap()).unwrap();
    assert_eq!(url.path(), "/app");
    let link = CheckInLink::from_url(&url).unwrap();
    assert_eq!(link.roster.as_str(), ROSTER);
    assert_eq!(link.day, Weekday::Mon);
    assert_eq!(link.slot, Slot::Morning);

    let (status, body) = call(
        &app,
        "GET",
        &format!("/checkin-context?mode=member&classId={ROSTER}&day=mon&slot=morning"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["day"], "월요일");
    assert_eq!(body["session_id"], "2024-03-04_오전");

    let (status, _) = call(
        &app,
        "GET",
        &format!("/checkin-context?mode=admin&classId={ROSTER}&day=mon&slot=morning"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
