use askama::Template;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{gym_access::GymAccess, session::AppState};
use crate::error::{AppError, Result};
use crate::models::{
    member::{CreateMemberData, Member, MemberSummary, UpdateMemberData},
    member_subscription::{MemberSubscription, MemberSubscriptionView},
};
use crate::services::{
    enrollment::{self, AssignRequest, Enrollment, InitialPayment},
    qr_generator::{self, BadgePayload},
    roles::Permission,
    storage::{self, StorageClient, MAX_PHOTO_BYTES},
    tokens,
};

const BADGE_CODE_BYTES: usize = 16;

#[derive(Template)]
#[template(path = "members/badge.html")]
struct BadgeTemplate {
    gym_id: Uuid,
    gym_name: String,
    member_id: Uuid,
    member_name: String,
    photo_url: Option<String>,
    qr_png_base64: String,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemberRequest {
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    birth_date: Option<NaiveDate>,
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateMemberRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    birth_date: Option<NaiveDate>,
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RenewRequest {
    payment: Option<InitialPayment>,
}

#[derive(Serialize)]
struct MemberDetail {
    #[serde(flatten)]
    member: Member,
    photo_url: Option<String>,
    subscriptions: Vec<MemberSubscriptionView>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_name(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn validate_email(email: Option<&str>) -> Result<()> {
    match email {
        Some(email) if !email.contains('@') => {
            Err(AppError::Validation(format!("Invalid email address: {}", email)))
        }
        _ => Ok(()),
    }
}

fn validate_birth_date(birth_date: Option<NaiveDate>, today: NaiveDate) -> Result<()> {
    match birth_date {
        Some(date) if date > today => Err(AppError::Validation(
            "Birth date cannot be in the future".to_string(),
        )),
        _ => Ok(()),
    }
}

fn photo_storage(state: &AppState) -> Result<&StorageClient> {
    state
        .storage
        .as_ref()
        .ok_or_else(|| AppError::Validation("Photo storage is not configured".to_string()))
}

fn photo_url(state: &AppState, member: &Member) -> Option<String> {
    let path = member.photo_path.as_deref()?;
    state.storage.as_ref().map(|storage| storage.public_url(path))
}

async fn find_member(state: &AppState, gym_id: Uuid, member_id: Uuid) -> Result<Member> {
    Member::find(&state.pool, gym_id, member_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
}

async fn list_members(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<MemberSummary>>> {
    GymAccess::load_active(&state, &session, gym_id, None).await?;

    let today = Utc::now().date_naive();
    let members = Member::search(&state.pool, gym_id, query.q.as_deref(), today).await?;

    Ok(Json(members))
}

async fn create_member(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Json(req): Json<MemberRequest>,
) -> Result<(StatusCode, Json<Member>)> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageMembers)).await?;

    validate_name("First name", &req.first_name)?;
    validate_name("Last name", &req.last_name)?;
    let email = trimmed(req.email);
    validate_email(email.as_deref())?;
    validate_birth_date(req.birth_date, Utc::now().date_naive())?;

    let member = Member::create(
        &state.pool,
        CreateMemberData {
            gym_id,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            email,
            phone: trimmed(req.phone),
            birth_date: req.birth_date,
            notes: trimmed(req.notes),
            badge_code: tokens::random_token(BADGE_CODE_BYTES)?,
        },
    )
    .await?;

    tracing::info!(gym_id = %gym_id, member_id = %member.id, user_id = %access.user_id(), "Member created");

    Ok((StatusCode::CREATED, Json(member)))
}

async fn get_member(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MemberDetail>> {
    GymAccess::load_active(&state, &session, gym_id, None).await?;

    let member = find_member(&state, gym_id, member_id).await?;
    let today = Utc::now().date_naive();
    let subscriptions = MemberSubscription::list_for_member(&state.pool, gym_id, member_id, today).await?;

    Ok(Json(MemberDetail {
        photo_url: photo_url(&state, &member),
        member,
        subscriptions,
    }))
}

async fn update_member(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<Json<Member>> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageMembers)).await?;

    if let Some(first_name) = &req.first_name {
        validate_name("First name", first_name)?;
    }
    if let Some(last_name) = &req.last_name {
        validate_name("Last name", last_name)?;
    }
    validate_email(req.email.as_deref().map(str::trim))?;
    validate_birth_date(req.birth_date, Utc::now().date_naive())?;

    let data = UpdateMemberData {
        first_name: req.first_name.map(|v| v.trim().to_string()),
        last_name: req.last_name.map(|v| v.trim().to_string()),
        email: req.email.map(|v| v.trim().to_string()),
        phone: req.phone.map(|v| v.trim().to_string()),
        birth_date: req.birth_date,
        notes: req.notes,
    };

    let member = Member::update(&state.pool, gym_id, member_id, data)
        .await?
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

    Ok(Json(member))
}

/// Members with recorded payments cannot be deleted
async fn ensure_deletable(pool: &PgPool, member_id: Uuid) -> Result<()> {
    let payments = Member::count_payments(pool, member_id).await?;
    if payments > 0 {
        return Err(AppError::Conflict(format!(
            "Member has {} recorded payment(s) and cannot be deleted",
            payments
        )));
    }
    Ok(())
}

async fn delete_member(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::DeleteMembers)).await?;

    let member = find_member(&state, gym_id, member_id).await?;
    ensure_deletable(&state.pool, member_id).await?;

    Member::delete(&state.pool, gym_id, member_id).await?;

    if let (Some(storage), Some(path)) = (&state.storage, member.photo_path.as_deref()) {
        if let Err(e) = storage.remove(path).await {
            tracing::warn!(error = %e, path = %path, "Failed to remove member photo");
        }
    }

    tracing::info!(gym_id = %gym_id, member_id = %member_id, user_id = %access.user_id(), "Member deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Accepts a multipart form with a `photo` field (JPEG, PNG or WebP)
async fn upload_photo(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
    mut multipart: Multipart,
) -> Result<Json<MemberDetail>> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageMembers)).await?;

    let storage = photo_storage(&state)?;

    let member = find_member(&state, gym_id, member_id).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        if field.name() != Some("photo") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.to_string()))?;
        upload = Some((content_type, bytes));
        break;
    }

    let (content_type, bytes) =
        upload.ok_or_else(|| AppError::Validation("Missing photo field".to_string()))?;

    let extension = storage::photo_extension(&content_type).ok_or_else(|| {
        AppError::Validation(format!("Unsupported image type: {}", content_type))
    })?;
    if bytes.is_empty() {
        return Err(AppError::Validation("Photo is empty".to_string()));
    }
    if bytes.len() > MAX_PHOTO_BYTES {
        return Err(AppError::Validation(format!(
            "Photo exceeds {} MiB",
            MAX_PHOTO_BYTES / (1024 * 1024)
        )));
    }

    let path = format!("{}/{}.{}", gym_id, member_id, extension);
    let stored = storage.upload(&path, &content_type, bytes.to_vec()).await?;

    if let Some(old) = member.photo_path.as_deref().filter(|old| *old != stored) {
        if let Err(e) = storage.remove(old).await {
            tracing::warn!(error = %e, path = %old, "Failed to remove replaced member photo");
        }
    }

    Member::set_photo_path(&state.pool, gym_id, member_id, Some(&stored)).await?;

    tracing::info!(gym_id = %gym_id, member_id = %member_id, path = %stored, "Member photo uploaded");

    let member = find_member(&state, gym_id, member_id).await?;
    let today = Utc::now().date_naive();
    let subscriptions = MemberSubscription::list_for_member(&state.pool, gym_id, member_id, today).await?;

    Ok(Json(MemberDetail {
        photo_url: photo_url(&state, &member),
        member,
        subscriptions,
    }))
}

async fn delete_photo(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageMembers)).await?;

    let member = find_member(&state, gym_id, member_id).await?;

    if let Some(path) = member.photo_path.as_deref() {
        if let Some(storage) = &state.storage {
            storage.remove(path).await?;
        }
        Member::set_photo_path(&state.pool, gym_id, member_id, None).await?;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Issues a new badge code; previously printed badges stop working
async fn regenerate_badge(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageMembers)).await?;

    let code = tokens::random_token(BADGE_CODE_BYTES)?;
    Member::set_badge_code(&state.pool, gym_id, member_id, &code)
        .await?
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

    tracing::info!(gym_id = %gym_id, member_id = %member_id, user_id = %access.user_id(), "Badge regenerated");

    Ok(StatusCode::NO_CONTENT)
}

fn signed_badge(state: &AppState, member: &Member) -> Result<BadgePayload> {
    let payload = BadgePayload::new(member.gym_id, member.id, member.badge_code.clone());
    Ok(payload.signed(&state.badge_key)?)
}

async fn badge_page(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    let access = match GymAccess::load_active(&state, &session, gym_id, None).await {
        Ok(access) => access,
        Err(AppError::Unauthorized) => return Ok(Redirect::to("/login").into_response()),
        Err(AppError::PaymentRequired) => {
            return Ok(Redirect::to(&format!("/gyms/{}/billing", gym_id)).into_response())
        }
        Err(e) => return Err(e),
    };

    let member = find_member(&state, gym_id, member_id).await?;
    let png = qr_generator::generate_qr_png(&signed_badge(&state, &member)?)?;

    let template = BadgeTemplate {
        gym_id,
        gym_name: access.gym.name.clone(),
        member_id,
        member_name: member.full_name(),
        photo_url: photo_url(&state, &member),
        qr_png_base64: base64::engine::general_purpose::STANDARD.encode(png),
    };

    Ok(Html(template.render()?).into_response())
}

async fn badge_png(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    GymAccess::load_active(&state, &session, gym_id, None).await?;

    let member = find_member(&state, gym_id, member_id).await?;
    let png = qr_generator::generate_qr_png(&signed_badge(&state, &member)?)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn badge_svg(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    GymAccess::load_active(&state, &session, gym_id, None).await?;

    let member = find_member(&state, gym_id, member_id).await?;
    let svg = qr_generator::generate_qr_svg(&signed_badge(&state, &member)?)?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

async fn list_member_subscriptions(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<MemberSubscriptionView>>> {
    GymAccess::load_active(&state, &session, gym_id, None).await?;

    find_member(&state, gym_id, member_id).await?;
    let today = Utc::now().date_naive();
    let subscriptions = MemberSubscription::list_for_member(&state.pool, gym_id, member_id, today).await?;

    Ok(Json(subscriptions))
}

async fn assign_subscription(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AssignRequest>,
) -> Result<(StatusCode, Json<Enrollment>)> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageMembers)).await?;
    if req.payment.is_some() {
        access.require(Permission::RecordPayments)?;
    }

    let today = Utc::now().date_naive();
    let enrollment = enrollment::assign(&state.pool, gym_id, member_id, access.user_id(), req, today).await?;

    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn renew_subscription(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<RenewRequest>>,
) -> Result<(StatusCode, Json<Enrollment>)> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageMembers)).await?;

    let Json(req) = body.unwrap_or_default();
    if req.payment.is_some() {
        access.require(Permission::RecordPayments)?;
    }

    let today = Utc::now().date_naive();
    let enrollment =
        enrollment::renew(&state.pool, gym_id, member_id, access.user_id(), req.payment, today).await?;

    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn cancel_subscription(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, member_subscription_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MemberSubscription>> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageMembers)).await?;

    let subscription = MemberSubscription::cancel(&state.pool, gym_id, member_subscription_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Member subscription not found".to_string()))?;

    tracing::info!(
        gym_id = %gym_id,
        member_subscription_id = %member_subscription_id,
        user_id = %access.user_id(),
        "Subscription cancelled"
    );

    Ok(Json(subscription))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/gyms/:gym_id/members",
            get(list_members).post(create_member),
        )
        .route(
            "/api/gyms/:gym_id/members/:member_id",
            get(get_member).put(update_member).delete(delete_member),
        )
        .route(
            "/api/gyms/:gym_id/members/:member_id/photo",
            post(upload_photo)
                .delete(delete_photo)
                .layer(DefaultBodyLimit::max(MAX_PHOTO_BYTES + 64 * 1024)),
        )
        .route(
            "/api/gyms/:gym_id/members/:member_id/badge/regenerate",
            post(regenerate_badge),
        )
        .route(
            "/api/gyms/:gym_id/members/:member_id/subscriptions",
            get(list_member_subscriptions).post(assign_subscription),
        )
        .route(
            "/api/gyms/:gym_id/members/:member_id/subscriptions/renew",
            post(renew_subscription),
        )
        .route(
            "/api/gyms/:gym_id/member-subscriptions/:member_subscription_id/cancel",
            post(cancel_subscription),
        )
        .route("/gyms/:gym_id/members/:member_id/badge", get(badge_page))
        .route("/gyms/:gym_id/members/:member_id/badge.png", get(badge_png))
        .route("/gyms/:gym_id/members/:member_id/badge.svg", get(badge_svg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::db::test_support;
    use crate::models::payment::{CreatePaymentData, Payment};
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn test_missing_photo_storage_is_a_validation_error() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/gymdesk_test")
            .unwrap();
        let state = AppState::new(pool, test_config());

        assert!(state.storage.is_none());
        assert!(matches!(photo_storage(&state), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_member_with_payments_cannot_be_deleted() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let gym = test_support::gym(&pool).await;
        let member = test_support::member(&pool, gym.id).await;

        assert!(ensure_deletable(&pool, member.id).await.is_ok());

        let mut tx = pool.begin().await.unwrap();
        Payment::create(
            &mut tx,
            CreatePaymentData {
                gym_id: gym.id,
                member_id: member.id,
                member_subscription_id: None,
                amount_cents: 3000,
                method: "cash".to_string(),
                note: None,
                recorded_by: Uuid::new_v4(),
                paid_at: None,
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(
            ensure_deletable(&pool, member.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email(None).is_ok());
        assert!(validate_email(Some("member@example.com")).is_ok());
        assert!(matches!(
            validate_email(Some("member.example.com")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_birth_date() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert!(validate_birth_date(None, today).is_ok());
        assert!(validate_birth_date(NaiveDate::from_ymd_opt(1990, 1, 1), today).is_ok());
        assert!(validate_birth_date(NaiveDate::from_ymd_opt(2025, 3, 11), today).is_err());
    }

    #[test]
    fn test_trimmed_drops_blank_values() {
        assert_eq!(trimmed(Some("  Ana ".into())), Some("Ana".to_string()));
        assert_eq!(trimmed(Some("   ".into())), None);
        assert_eq!(trimmed(None), None);
    }
}
