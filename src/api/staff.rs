use askama::Template;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{
    auth::{get_authenticated_user, AuthenticatedUser},
    gym_access::GymAccess,
    session::AppState,
};
use crate::error::{AppError, Result};
use crate::models::{
    gbu::GymUser,
    gym::Gym,
    invitation::{CreateInvitationData, Invitation},
};
use crate::services::{
    roles::{Permission, Role},
    staff::{self, StaffChange, StaffRuleError},
    tokens,
};

const INVITATION_TOKEN_BYTES: usize = 32;
const INVITATION_VALID_DAYS: i64 = 7;

#[derive(Template)]
#[template(path = "invitations/accept.html")]
struct AcceptInvitationTemplate {
    gym_name: String,
    role: String,
    email: String,
    expires_at: String,
    token: String,
}

#[derive(Serialize)]
struct StaffList {
    staff: Vec<GymUser>,
    assignable_roles: Vec<Role>,
}

#[derive(Deserialize)]
struct RoleChangeRequest {
    role: Role,
}

#[derive(Deserialize)]
struct InviteRequest {
    email: String,
    role: Role,
}

#[derive(Serialize)]
struct InviteResponse {
    invitation: Invitation,
    /// Shared with the invitee out of band; the token itself is never stored
    accept_url: String,
}

async fn find_staff(state: &AppState, gym_id: Uuid, user_id: Uuid) -> Result<GymUser> {
    GymUser::find(&state.pool, gym_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Staff member not found".to_string()))
}

async fn list_staff(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
) -> Result<Json<StaffList>> {
    let access = GymAccess::load(&state, &session, gym_id).await?;

    let staff = GymUser::list_by_gym(&state.pool, gym_id).await?;

    Ok(Json(StaffList {
        staff,
        assignable_roles: access.role.assignable_roles(),
    }))
}

async fn change_role(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RoleChangeRequest>,
) -> Result<Json<GymUser>> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageStaff)).await?;

    let target = find_staff(&state, gym_id, user_id).await?;
    staff::check_role_change(
        StaffChange {
            actor_id: access.user_id(),
            actor_role: access.role,
            target_id: target.user_id,
            target_role: target.role()?,
        },
        req.role,
    )?;

    let updated = GymUser::set_role(&state.pool, gym_id, user_id, req.role).await?;

    tracing::info!(
        gym_id = %gym_id,
        target_user_id = %user_id,
        role = %req.role,
        actor_user_id = %access.user_id(),
        "Staff role changed"
    );

    Ok(Json(updated))
}

/// Removes a staff member; anyone but the owner may also use this to leave
async fn remove_staff(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    let access = GymAccess::load(&state, &session, gym_id).await?;

    let target = find_staff(&state, gym_id, user_id).await?;
    staff::check_removal(StaffChange {
        actor_id: access.user_id(),
        actor_role: access.role,
        target_id: target.user_id,
        target_role: target.role()?,
    })?;

    GymUser::delete(&state.pool, gym_id, user_id).await?;

    tracing::info!(
        gym_id = %gym_id,
        target_user_id = %user_id,
        actor_user_id = %access.user_id(),
        "Staff member removed"
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn invite(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Json(req): Json<InviteRequest>,
) -> Result<(StatusCode, Json<InviteResponse>)> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageStaff)).await?;

    if !access.role.can_assign(req.role) {
        return Err(StaffRuleError::CannotAssign(req.role).into());
    }

    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid email address is required".to_string()));
    }

    if GymUser::find_by_email(&state.pool, gym_id, &email).await?.is_some() {
        return Err(AppError::Conflict(format!("{} is already part of this gym", email)));
    }
    if Invitation::find_pending_for_email(&state.pool, gym_id, &email)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!(
            "{} already has a pending invitation",
            email
        )));
    }

    let token = tokens::random_token(INVITATION_TOKEN_BYTES)?;
    let invitation = Invitation::create(
        &state.pool,
        CreateInvitationData {
            gym_id,
            email,
            role: req.role,
            token_hash: tokens::hash_token(&token),
            invited_by: access.user_id(),
            expires_at: Utc::now() + Duration::days(INVITATION_VALID_DAYS),
        },
    )
    .await?;

    tracing::info!(
        gym_id = %gym_id,
        invitation_id = %invitation.id,
        role = %req.role,
        "Invitation created"
    );

    let accept_url = state.config.absolute_url(&format!("/invitations/{}", token));

    Ok((
        StatusCode::CREATED,
        Json(InviteResponse {
            invitation,
            accept_url,
        }),
    ))
}

async fn list_invitations(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
) -> Result<Json<Vec<Invitation>>> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageStaff)).await?;

    let invitations = Invitation::list_by_gym(&state.pool, gym_id).await?;

    Ok(Json(invitations))
}

async fn revoke_invitation(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageStaff)).await?;

    if !Invitation::revoke(&state.pool, gym_id, invitation_id).await? {
        return Err(AppError::NotFound("No pending invitation with that id".to_string()));
    }

    tracing::info!(gym_id = %gym_id, invitation_id = %invitation_id, "Invitation revoked");

    Ok(StatusCode::NO_CONTENT)
}

/// Resolves a token to a still-pending invitation and its gym
async fn pending_invitation(state: &AppState, token: &str) -> Result<(Invitation, Gym)> {
    let invitation = Invitation::find_by_token_hash(&state.pool, &tokens::hash_token(token))
        .await?
        .filter(|inv| inv.is_pending(Utc::now()))
        .ok_or_else(|| AppError::NotFound("Invitation not found or expired".to_string()))?;

    let gym = Gym::find_by_id(&state.pool, invitation.gym_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Gym not found".to_string()))?;

    Ok((invitation, gym))
}

fn ensure_invitee(user: &AuthenticatedUser, invitation: &Invitation) -> Result<()> {
    if user.email.trim().eq_ignore_ascii_case(invitation.email.trim()) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "This invitation was sent to a different email address".to_string(),
        ))
    }
}

async fn invitation_page(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
) -> Result<Response> {
    let user = match get_authenticated_user(&session).await {
        Ok(user) => user,
        Err(_) => return Ok(Redirect::to("/login").into_response()),
    };

    let (invitation, gym) = pending_invitation(&state, &token).await?;
    ensure_invitee(&user, &invitation)?;

    let template = AcceptInvitationTemplate {
        gym_name: gym.name,
        role: invitation.role,
        email: invitation.email,
        expires_at: invitation.expires_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        token,
    };

    Ok(Html(template.render()?).into_response())
}

async fn accept_invitation(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
) -> Result<Redirect> {
    let user = get_authenticated_user(&session).await?;

    let (invitation, gym) = pending_invitation(&state, &token).await?;
    ensure_invitee(&user, &invitation)?;

    if GymUser::find(&state.pool, gym.id, user.user_id).await?.is_some() {
        return Err(AppError::Conflict("You are already part of this gym".to_string()));
    }

    let role: Role = invitation
        .role
        .parse()
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

    let mut tx = state.pool.begin().await?;
    GymUser::insert(&mut tx, gym.id, user.user_id, &user.email, role).await?;
    Invitation::mark_accepted(&mut tx, invitation.id).await?;
    tx.commit().await?;

    tracing::info!(
        gym_id = %gym.id,
        user_id = %user.user_id,
        invitation_id = %invitation.id,
        "Invitation accepted"
    );

    Ok(Redirect::to(&format!("/gyms/{}", gym.id)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/gyms/:gym_id/staff", get(list_staff))
        .route(
            "/api/gyms/:gym_id/staff/:user_id",
            put(change_role).delete(remove_staff),
        )
        .route(
            "/api/gyms/:gym_id/invitations",
            get(list_invitations).post(invite),
        )
        .route(
            "/api/gyms/:gym_id/invitations/:invitation_id",
            delete(revoke_invitation),
        )
        .route("/invitations/:token", get(invitation_page))
        .route("/invitations/:token/accept", post(accept_invitation))
}
