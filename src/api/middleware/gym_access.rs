use chrono::Utc;
use tower_sessions::Session;
use uuid::Uuid;

use super::auth::{get_authenticated_user, AuthenticatedUser};
use super::session::AppState;
use crate::error::{AppError, Result};
use crate::models::{gbu::GymUser, gym::Gym};
use crate::services::roles::{Permission, Role};

/// The caller's standing in one gym: who they are, the gym, and their role
#[derive(Debug, Clone)]
pub struct GymAccess {
    pub user: AuthenticatedUser,
    pub gym: Gym,
    pub role: Role,
}

impl GymAccess {
    /// Authenticates the caller and resolves their role in `gym_id`.
    /// Gyms the caller does not belong to are reported as not found.
    pub async fn load(state: &AppState, session: &Session, gym_id: Uuid) -> Result<Self> {
        let user = get_authenticated_user(session).await?;

        let membership = GymUser::find(&state.pool, gym_id, user.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gym not found".to_string()))?;

        let gym = Gym::find_by_id(&state.pool, gym_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gym not found".to_string()))?;

        let role = membership.role()?;

        Ok(Self { user, gym, role })
    }

    /// Loads access, then requires active billing and `permission`
    pub async fn load_active(
        state: &AppState,
        session: &Session,
        gym_id: Uuid,
        permission: Option<Permission>,
    ) -> Result<Self> {
        let access = Self::load(state, session, gym_id).await?;
        access.require_active_billing()?;
        if let Some(permission) = permission {
            access.require(permission)?;
        }
        Ok(access)
    }

    pub fn user_id(&self) -> Uuid {
        self.user.user_id
    }

    pub fn require(&self, permission: Permission) -> Result<()> {
        if self.role.can(permission) {
            Ok(())
        } else {
            tracing::debug!(
                gym_id = %self.gym.id,
                user_id = %self.user.user_id,
                role = %self.role,
                permission = %permission,
                "Permission denied"
            );
            Err(AppError::Forbidden(format!(
                "Your role ({}) cannot {}",
                self.role, permission
            )))
        }
    }

    pub fn require_active_billing(&self) -> Result<()> {
        if self.gym.has_active_billing(Utc::now()) {
            Ok(())
        } else {
            Err(AppError::PaymentRequired)
        }
    }
}
