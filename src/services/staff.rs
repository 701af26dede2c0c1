//! Hierarchy rules for changing and removing gym staff.

use uuid::Uuid;

use crate::services::roles::{Permission, Role};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StaffRuleError {
    #[error("The owner's role cannot be changed")]
    OwnerIsFixed,

    #[error("You cannot change your own role")]
    SelfChange,

    #[error("You can only manage staff ranked below you")]
    Outranked,

    #[error("You cannot assign the {0} role")]
    CannotAssign(Role),
}

/// Who is acting, and on whom
#[derive(Debug, Clone, Copy)]
pub struct StaffChange {
    pub actor_id: Uuid,
    pub actor_role: Role,
    pub target_id: Uuid,
    pub target_role: Role,
}

pub fn check_role_change(change: StaffChange, new_role: Role) -> Result<(), StaffRuleError> {
    if change.target_role == Role::Owner {
        return Err(StaffRuleError::OwnerIsFixed);
    }
    if change.actor_id == change.target_id {
        return Err(StaffRuleError::SelfChange);
    }
    if !change.actor_role.can_manage(change.target_role) {
        return Err(StaffRuleError::Outranked);
    }
    if !change.actor_role.can_assign(new_role) {
        return Err(StaffRuleError::CannotAssign(new_role));
    }
    Ok(())
}

/// Anyone but the owner may leave; removing someone else needs a higher rank
pub fn check_removal(change: StaffChange) -> Result<(), StaffRuleError> {
    if change.target_role == Role::Owner {
        return Err(StaffRuleError::OwnerIsFixed);
    }
    if change.actor_id == change.target_id {
        return Ok(());
    }
    if !change.actor_role.can(Permission::ManageStaff) || !change.actor_role.can_manage(change.target_role) {
        return Err(StaffRuleError::Outranked);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(actor_role: Role, target_role: Role) -> StaffChange {
        StaffChange {
            actor_id: Uuid::new_v4(),
            actor_role,
            target_id: Uuid::new_v4(),
            target_role,
        }
    }

    #[test]
    fn test_owner_promotes_staff_to_admin() {
        assert_eq!(check_role_change(change(Role::Owner, Role::Staff), Role::Admin), Ok(()));
    }

    #[test]
    fn test_admin_cannot_promote_to_admin() {
        assert_eq!(
            check_role_change(change(Role::Admin, Role::Staff), Role::Admin),
            Err(StaffRuleError::CannotAssign(Role::Admin))
        );
    }

    #[test]
    fn test_admin_cannot_touch_other_admin() {
        assert_eq!(
            check_role_change(change(Role::Admin, Role::Admin), Role::Staff),
            Err(StaffRuleError::Outranked)
        );
    }

    #[test]
    fn test_owner_role_is_fixed() {
        assert_eq!(
            check_role_change(change(Role::Owner, Role::Owner), Role::Admin),
            Err(StaffRuleError::OwnerIsFixed)
        );
        assert_eq!(
            check_removal(change(Role::Owner, Role::Owner)),
            Err(StaffRuleError::OwnerIsFixed)
        );
    }

    #[test]
    fn test_nobody_hands_out_ownership() {
        assert_eq!(
            check_role_change(change(Role::Owner, Role::Admin), Role::Owner),
            Err(StaffRuleError::CannotAssign(Role::Owner))
        );
    }

    #[test]
    fn test_self_changes() {
        let id = Uuid::new_v4();
        let own = StaffChange {
            actor_id: id,
            actor_role: Role::Admin,
            target_id: id,
            target_role: Role::Admin,
        };
        assert_eq!(check_role_change(own, Role::Staff), Err(StaffRuleError::SelfChange));
        assert_eq!(check_removal(own), Ok(()));
    }

    #[test]
    fn test_staff_cannot_remove_staff() {
        assert_eq!(
            check_removal(change(Role::Staff, Role::Staff)),
            Err(StaffRuleError::Outranked)
        );
        assert_eq!(check_removal(change(Role::Admin, Role::Staff)), Ok(()));
    }
}
