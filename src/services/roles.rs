//! Static role rankings and role/permission lookup tables.
//!
//! There is no evaluator here: a role either has a permission or it does not,
//! and hierarchy checks compare fixed integer ranks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ManageGym,
    ManageBilling,
    ManageStaff,
    ManagePlans,
    ManageMembers,
    DeleteMembers,
    RecordPayments,
    ManageProducts,
    SellProducts,
    ViewReports,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }

    /// Hierarchy rank: owner > admin > staff
    pub fn rank(&self) -> u8 {
        match self {
            Role::Owner => 3,
            Role::Admin => 2,
            Role::Staff => 1,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        use Permission::*;

        match self {
            Role::Owner => true,
            Role::Admin => !matches!(permission, ManageGym | ManageBilling),
            Role::Staff => matches!(permission, ManageMembers | RecordPayments | SellProducts),
        }
    }

    /// An actor may only change or remove staff ranked strictly below them.
    pub fn can_manage(&self, target: Role) -> bool {
        self.can(Permission::ManageStaff) && self.rank() > target.rank()
    }

    /// Roles an actor may hand out through invitations or role changes.
    /// Ownership is never assigned this way.
    pub fn can_assign(&self, role: Role) -> bool {
        role != Role::Owner && self.can(Permission::ManageStaff) && self.rank() > role.rank()
    }

    pub fn assignable_roles(&self) -> Vec<Role> {
        [Role::Admin, Role::Staff]
            .into_iter()
            .filter(|r| self.can_assign(*r))
            .collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Permission::ManageGym => "manage the gym",
            Permission::ManageBilling => "manage billing",
            Permission::ManageStaff => "manage staff",
            Permission::ManagePlans => "manage subscription plans",
            Permission::ManageMembers => "manage members",
            Permission::DeleteMembers => "delete members",
            Permission::RecordPayments => "record payments",
            Permission::ManageProducts => "manage products",
            Permission::SellProducts => "sell products",
            Permission::ViewReports => "view reports",
        };
        f.write_str(label)
    }
}
