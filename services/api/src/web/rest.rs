//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use attendance_core::{
    monthly_report, schedule::weekday_label, schedule::weekly_links, AttendanceError,
    CheckInLink, CheckInOutcome, Member, MemberStats, RosterId, SessionKey, Slot, SlotCounts,
    YearMonth,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_members_handler,
        add_member_handler,
        remove_member_handler,
        get_session_handler,
        toggle_presence_handler,
        reset_session_handler,
        ingest_handler,
        check_in_handler,
        cancel_check_in_handler,
        register_handler,
        report_handler,
        links_handler,
        checkin_context_handler,
    ),
    components(
        schemas(
            MemberResponse, AddMemberRequest, PresenceResponse, ToggleRequest, ToggleResponse,
            ResetResponse, IngestRequest, IngestResponse, CheckInRequest, CheckInResponse,
            CancelResponse, RegisterRequest, SlotCountsResponse, MemberStatsResponse,
            DailyResponse, ReportResponse, LinkResponse, CheckInContextResponse,
        )
    ),
    tags(
        (name = "Attendance API", description = "Roster, session and statistics endpoints for the attendance tracker.")
    )
)]
pub struct ApiDoc;

type HandlerResult<T> = Result<T, (StatusCode, String)>;

/// Maps engine errors onto HTTP statuses. Invariant violations are user-facing
/// notices; port failures are logged and hidden.
pub fn error_response(e: AttendanceError) -> (StatusCode, String) {
    let status = match &e {
        AttendanceError::DuplicateName(_) | AttendanceError::MemberHasAttendance { .. } => {
            StatusCode::CONFLICT
        }
        AttendanceError::UnknownMember(_) => StatusCode::NOT_FOUND,
        AttendanceError::Port(_) => {
            error!("Storage failure: {:?}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
        AttendanceError::EmptyInput
        | AttendanceError::InvalidName(_)
        | AttendanceError::InvalidDate(_)
        | AttendanceError::InvalidSlot(_)
        | AttendanceError::InvalidMonth(_)
        | AttendanceError::InvalidRosterId(_)
        | AttendanceError::InvalidSchedule(_)
        | AttendanceError::InvalidLink(_) => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string())
}

fn parse_slot(slot: &str) -> HandlerResult<Slot> {
    slot.parse().map_err(error_response)
}

fn parse_key(date: &str, slot: &str) -> HandlerResult<SessionKey> {
    SessionKey::parse(date, slot).map_err(error_response)
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct MemberResponse {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Member> for MemberResponse {
    fn from(member: Member) -> Self {
        Self {
            id: member.id,
            name: member.name,
            created_at: member.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub name: String,
}

/// The present ids of one session. Missing sessions read as empty.
#[derive(Serialize, ToSchema)]
pub struct PresenceResponse {
    pub session_id: String,
    pub date: String,
    pub slot: String,
    pub present_ids: Vec<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct ToggleRequest {
    pub member_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct ToggleResponse {
    pub member_id: Uuid,
    pub present: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ResetResponse {
    pub session_id: String,
    pub cleared: usize,
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
pub struct IngestRequest {
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct IngestResponse {
    pub session_id: String,
    pub registered: Vec<MemberResponse>,
    pub matched: usize,
    pub newly_present: usize,
    pub present_total: usize,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckInRequest {
    pub member_id: Uuid,
    pub slot: String,
}

#[derive(Serialize, ToSchema)]
pub struct CheckInResponse {
    /// `checked_in`, or `already_present` when the caller should offer cancellation.
    pub status: String,
    pub member: MemberResponse,
    pub session_id: String,
    pub message: String,
}

impl From<CheckInOutcome> for CheckInResponse {
    fn from(outcome: CheckInOutcome) -> Self {
        match outcome {
            CheckInOutcome::CheckedIn { member, key } => Self {
                status: "checked_in".to_string(),
                message: format!("{}님 출석 확인 완료!", member.name),
                member: member.into(),
                session_id: key.id(),
            },
            CheckInOutcome::AlreadyPresent { member, key } => Self {
                status: "already_present".to_string(),
                message: "이미 출석되었습니다. 취소하시겠습니까?".to_string(),
                member: member.into(),
                session_id: key.id(),
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub slot: String,
}

/// Counts keyed by slot label (`오전`, `오후`, `저녁`), plus their sum.
#[derive(Serialize, ToSchema)]
pub struct SlotCountsResponse {
    pub slots: BTreeMap<String, usize>,
    pub total: usize,
}

impl From<&SlotCounts> for SlotCountsResponse {
    fn from(counts: &SlotCounts) -> Self {
        Self {
            slots: counts
                .iter()
                .map(|(slot, n)| (slot.label().to_string(), n))
                .collect(),
            total: counts.total(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MemberStatsResponse {
    pub member_id: Uuid,
    pub name: String,
    pub counts: SlotCountsResponse,
    pub rate: u32,
}

impl From<&MemberStats> for MemberStatsResponse {
    fn from(stats: &MemberStats) -> Self {
        Self {
            member_id: stats.member_id,
            name: stats.name.clone(),
            counts: (&stats.slots).into(),
            rate: stats.rate,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DailyResponse {
    pub date: String,
    pub present: BTreeMap<String, Vec<String>>,
    pub counts: SlotCountsResponse,
}

#[derive(Serialize, ToSchema)]
pub struct ReportResponse {
    pub month: String,
    pub session_count: usize,
    pub members: Vec<MemberStatsResponse>,
    pub summary: SlotCountsResponse,
    pub daily: Vec<DailyResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct LinkResponse {
    pub day: String,
    pub slot: String,
    pub url: String,
}

#[derive(Serialize, ToSchema)]
pub struct CheckInContextResponse {
    pub roster_id: String,
    pub day: String,
    pub slot: String,
    /// Today's session for the link's slot; check-ins always land on today.
    pub session_id: String,
}

//=========================================================================================
// Member Handlers
//=========================================================================================

/// List the roster's members, sorted by name.
#[utoipa::path(
    get,
    path = "/rosters/{roster_id}/members",
    responses((status = 200, description = "Members of the roster", body = [MemberResponse])),
    params(("roster_id" = String, Path, description = "Class/channel identifier."))
)]
pub async fn list_members_handler(
    State(state): State<Arc<AppState>>,
    Path(roster_id): Path<String>,
) -> HandlerResult<Json<Vec<MemberResponse>>> {
    let rec = state.reconciler(&roster_id)?;
    let members = rec.roster().members().await.map_err(error_response)?;
    Ok(Json(members.into_iter().map(MemberResponse::from).collect()))
}

/// Register a member by name.
#[utoipa::path(
    post,
    path = "/rosters/{roster_id}/members",
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member registered", body = MemberResponse),
        (status = 400, description = "Blank name"),
        (status = 409, description = "Name already on the roster")
    ),
    params(("roster_id" = String, Path, description = "Class/channel identifier."))
)]
pub async fn add_member_handler(
    State(state): State<Arc<AppState>>,
    Path(roster_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> HandlerResult<impl IntoResponse> {
    let rec = state.reconciler(&roster_id)?;
    let member = rec.roster().add_member(&req.name).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(MemberResponse::from(member))))
}

/// Remove a member that has no attendance records.
///
/// Confirmation is the client's job; this endpoint deletes immediately.
#[utoipa::path(
    delete,
    path = "/rosters/{roster_id}/members/{member_id}",
    responses(
        (status = 200, description = "Member removed", body = MemberResponse),
        (status = 404, description = "No such member"),
        (status = 409, description = "Member has attendance records")
    ),
    params(
        ("roster_id" = String, Path, description = "Class/channel identifier."),
        ("member_id" = Uuid, Path, description = "Member to remove.")
    )
)]
pub async fn remove_member_handler(
    State(state): State<Arc<AppState>>,
    Path((roster_id, member_id)): Path<(String, Uuid)>,
) -> HandlerResult<Json<MemberResponse>> {
    let rec = state.reconciler(&roster_id)?;
    match rec.roster().remove_member(member_id).await.map_err(error_response)? {
        Some(member) => Ok(Json(member.into())),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("Member {} is not on the roster", member_id),
        )),
    }
}

//=========================================================================================
// Session Handlers
//=========================================================================================

/// Read a session's presence.
#[utoipa::path(
    get,
    path = "/rosters/{roster_id}/sessions/{date}/{slot}",
    responses(
        (status = 200, description = "Present member ids", body = PresenceResponse),
        (status = 400, description = "Malformed date or slot")
    ),
    params(
        ("roster_id" = String, Path, description = "Class/channel identifier."),
        ("date" = String, Path, description = "YYYY-MM-DD"),
        ("slot" = String, Path, description = "오전, 오후 or 저녁")
    )
)]
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path((roster_id, date, slot)): Path<(String, String, String)>,
) -> HandlerResult<Json<PresenceResponse>> {
    let rec = state.reconciler(&roster_id)?;
    let key = parse_key(&date, &slot)?;
    let presence = rec.sessions().get_presence(&key).await.map_err(error_response)?;
    Ok(Json(PresenceResponse {
        session_id: key.id(),
        date: key.date.format("%Y-%m-%d").to_string(),
        slot: key.slot.label().to_string(),
        present_ids: presence.into_iter().collect(),
    }))
}

/// Toggle one member's presence from the admin grid.
#[utoipa::path(
    post,
    path = "/rosters/{roster_id}/sessions/{date}/{slot}/toggle",
    request_body = ToggleRequest,
    responses(
        (status = 200, description = "Presence after the toggle", body = ToggleResponse),
        (status = 404, description = "Member not on the roster")
    ),
    params(
        ("roster_id" = String, Path, description = "Class/channel identifier."),
        ("date" = String, Path, description = "YYYY-MM-DD"),
        ("slot" = String, Path, description = "오전, 오후 or 저녁")
    )
)]
pub async fn toggle_presence_handler(
    State(state): State<Arc<AppState>>,
    Path((roster_id, date, slot)): Path<(String, String, String)>,
    Json(req): Json<ToggleRequest>,
) -> HandlerResult<Json<ToggleResponse>> {
    let rec = state.reconciler(&roster_id)?;
    let key = parse_key(&date, &slot)?;
    let present = rec
        .toggle_presence(req.member_id, &key)
        .await
        .map_err(error_response)?;
    Ok(Json(ToggleResponse {
        member_id: req.member_id,
        present,
    }))
}

/// Clear a session's attendance.
#[utoipa::path(
    post,
    path = "/rosters/{roster_id}/sessions/{date}/{slot}/reset",
    responses((status = 200, description = "Session emptied", body = ResetResponse)),
    params(
        ("roster_id" = String, Path, description = "Class/channel identifier."),
        ("date" = String, Path, description = "YYYY-MM-DD"),
        ("slot" = String, Path, description = "오전, 오후 or 저녁")
    )
)]
pub async fn reset_session_handler(
    State(state): State<Arc<AppState>>,
    Path((roster_id, date, slot)): Path<(String, String, String)>,
) -> HandlerResult<Json<ResetResponse>> {
    let rec = state.reconciler(&roster_id)?;
    let key = parse_key(&date, &slot)?;
    let cleared = rec.sessions().reset_presence(&key).await.map_err(error_response)?;
    let message = if cleared == 0 {
        "지울 데이터가 없습니다.".to_string()
    } else {
        "기록이 초기화되었습니다.".to_string()
    };
    Ok(Json(ResetResponse {
        session_id: key.id(),
        cleared,
        message,
    }))
}

/// Ingest pasted roster text into a session.
#[utoipa::path(
    post,
    path = "/rosters/{roster_id}/sessions/{date}/{slot}/ingest",
    request_body = IngestRequest,
    responses(
        (status = 200, description = "Text ingested", body = IngestResponse),
        (status = 400, description = "Blank text")
    ),
    params(
        ("roster_id" = String, Path, description = "Class/channel identifier."),
        ("date" = String, Path, description = "YYYY-MM-DD"),
        ("slot" = String, Path, description = "오전, 오후 or 저녁")
    )
)]
pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Path((roster_id, date, slot)): Path<(String, String, String)>,
    Json(req): Json<IngestRequest>,
) -> HandlerResult<Json<IngestResponse>> {
    let rec = state.reconciler(&roster_id)?;
    let key = parse_key(&date, &slot)?;
    let report = rec.ingest(&req.text, &key).await.map_err(error_response)?;
    Ok(Json(IngestResponse {
        session_id: report.key.id(),
        registered: report.registered.into_iter().map(MemberResponse::from).collect(),
        matched: report.matched,
        newly_present: report.newly_present,
        present_total: report.present_total,
    }))
}

//=========================================================================================
// Self-Service Handlers
//=========================================================================================

fn scheduled_today(state: &AppState, key: &SessionKey) -> HandlerResult<()> {
    if state.config.schedule.allows(key) {
        Ok(())
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            format!("{} is not scheduled on {}", key.slot, key.date),
        ))
    }
}

/// Check a member in for today's session of the given slot.
///
/// A second check-in writes nothing and answers `already_present`; the client
/// then asks whether to cancel.
#[utoipa::path(
    post,
    path = "/rosters/{roster_id}/checkin",
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Check-in outcome", body = CheckInResponse),
        (status = 404, description = "Member not on the roster")
    ),
    params(("roster_id" = String, Path, description = "Class/channel identifier."))
)]
pub async fn check_in_handler(
    State(state): State<Arc<AppState>>,
    Path(roster_id): Path<String>,
    Json(req): Json<CheckInRequest>,
) -> HandlerResult<Json<CheckInResponse>> {
    let rec = state.reconciler(&roster_id)?;
    let slot = parse_slot(&req.slot)?;
    scheduled_today(&state, &rec.today(slot))?;
    let outcome = rec
        .self_check_in(req.member_id, slot)
        .await
        .map_err(error_response)?;
    Ok(Json(outcome.into()))
}

/// Cancel today's check-in after the member confirmed it.
#[utoipa::path(
    post,
    path = "/rosters/{roster_id}/checkin/cancel",
    request_body = CheckInRequest,
    responses((status = 200, description = "Whether a check-in was removed", body = CancelResponse)),
    params(("roster_id" = String, Path, description = "Class/channel identifier."))
)]
pub async fn cancel_check_in_handler(
    State(state): State<Arc<AppState>>,
    Path(roster_id): Path<String>,
    Json(req): Json<CheckInRequest>,
) -> HandlerResult<Json<CancelResponse>> {
    let rec = state.reconciler(&roster_id)?;
    let slot = parse_slot(&req.slot)?;
    let cancelled = rec
        .cancel_check_in(req.member_id, slot)
        .await
        .map_err(error_response)?;
    Ok(Json(CancelResponse { cancelled }))
}

/// Register a newcomer and check them in for today.
#[utoipa::path(
    post,
    path = "/rosters/{roster_id}/checkin/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered and checked in", body = CheckInResponse),
        (status = 400, description = "Name too short"),
        (status = 409, description = "Name already on the roster")
    ),
    params(("roster_id" = String, Path, description = "Class/channel identifier."))
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Path(roster_id): Path<String>,
    Json(req): Json<RegisterRequest>,
) -> HandlerResult<impl IntoResponse> {
    let rec = state.reconciler(&roster_id)?;
    let slot = parse_slot(&req.slot)?;
    scheduled_today(&state, &rec.today(slot))?;
    let outcome = rec.self_register(&req.name, slot).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(CheckInResponse::from(outcome))))
}

/// Resolve a shared self-check-in link's query into its context.
#[utoipa::path(
    get,
    path = "/checkin-context",
    responses(
        (status = 200, description = "Link context", body = CheckInContextResponse),
        (status = 400, description = "Not a valid member link")
    ),
    params(
        ("mode" = String, Query, description = "Must be `member`."),
        ("classId" = String, Query, description = "Class/channel identifier."),
        ("day" = String, Query, description = "Weekday label, e.g. 월요일."),
        ("slot" = String, Query, description = "오전, 오후 or 저녁")
    )
)]
pub async fn checkin_context_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> HandlerResult<Json<CheckInContextResponse>> {
    let link = CheckInLink::from_params(&params).map_err(error_response)?;
    let rec = state.reconciler(link.roster.as_str())?;
    Ok(Json(CheckInContextResponse {
        roster_id: link.roster.to_string(),
        day: weekday_label(link.day).to_string(),
        slot: link.slot.label().to_string(),
        session_id: rec.today(link.slot).id(),
    }))
}

//=========================================================================================
// Reporting Handlers
//=========================================================================================

/// Monthly statistics for the roster.
#[utoipa::path(
    get,
    path = "/rosters/{roster_id}/reports/{month}",
    responses(
        (status = 200, description = "Monthly report", body = ReportResponse),
        (status = 400, description = "Malformed month")
    ),
    params(
        ("roster_id" = String, Path, description = "Class/channel identifier."),
        ("month" = String, Path, description = "YYYY-MM")
    )
)]
pub async fn report_handler(
    State(state): State<Arc<AppState>>,
    Path((roster_id, month)): Path<(String, String)>,
) -> HandlerResult<Json<ReportResponse>> {
    let rec = state.reconciler(&roster_id)?;
    let month: YearMonth = month.parse().map_err(error_response)?;
    let members = rec.roster().members().await.map_err(error_response)?;
    let sessions = rec.sessions().sessions().await.map_err(error_response)?;

    let report = monthly_report(&members, &sessions, month);
    Ok(Json(ReportResponse {
        month: report.month.to_string(),
        session_count: report.session_count,
        members: report.members.iter().map(MemberStatsResponse::from).collect(),
        summary: (&report.summary.slots).into(),
        daily: report
            .daily
            .iter()
            .map(|day| DailyResponse {
                date: day.date.format("%Y-%m-%d").to_string(),
                present: day
                    .present
                    .iter()
                    .map(|(slot, names)| (slot.label().to_string(), names.clone()))
                    .collect(),
                counts: (&day.counts).into(),
            })
            .collect(),
    }))
}

/// Self-check-in links for every scheduled weekday and slot, Monday first.
/// Rendering them as QR codes is up to the client.
#[utoipa::path(
    get,
    path = "/rosters/{roster_id}/links",
    responses((status = 200, description = "Shareable links", body = [LinkResponse])),
    params(("roster_id" = String, Path, description = "Class/channel identifier."))
)]
pub async fn links_handler(
    State(state): State<Arc<AppState>>,
    Path(roster_id): Path<String>,
) -> HandlerResult<Json<Vec<LinkResponse>>> {
    let roster = RosterId::new(&roster_id).map_err(error_response)?;
    let links = weekly_links(&roster, &state.config.schedule)
        .into_iter()
        .map(|link| LinkResponse {
            day: weekday_label(link.day).to_string(),
            slot: link.slot.label().to_string(),
            url: link.to_url(&state.config.checkin_base_url).to_string(),
        })
        .collect();
    Ok(Json(links))
}
