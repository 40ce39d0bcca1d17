use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::numeric_id;

numeric_id!(UserId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requester,
    Manager,
    Director,
    Master,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Manager => "manager",
            Self::Director => "director",
            Self::Master => "master",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "requester" => Some(Self::Requester),
            "manager" => Some(Self::Manager),
            "director" => Some(Self::Director),
            "master" => Some(Self::Master),
            _ => None,
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;

        match self {
            Self::Requester => &[CreateRequisition],
            Self::Manager => &[CreateRequisition, ApproveAsManager, RejectApprovedQuote],
            Self::Director => &[CreateRequisition, ApproveAsDirector, RejectApprovedQuote],
            Self::Master => &[
                CreateRequisition,
                ApproveAsManager,
                ApproveAsDirector,
                RejectApprovedQuote,
                Override,
            ],
        }
    }

    pub fn grants(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CreateRequisition,
    ApproveAsManager,
    ApproveAsDirector,
    RejectApprovedQuote,
    Override,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRequisition => "create_requisition",
            Self::ApproveAsManager => "approve_as_manager",
            Self::ApproveAsDirector => "approve_as_director",
            Self::RejectApprovedQuote => "reject_approved_quote",
            Self::Override => "override",
        }
    }
}

/// The caller of an engine operation, as resolved by the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub roles: BTreeSet<Role>,
}

impl Actor {
    pub fn new(id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self { id, roles: roles.into_iter().collect() }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.roles.iter().any(|role| role.grants(capability))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, Capability, Role, UserId};

    #[test]
    fn only_master_may_override() {
        for role in [Role::Requester, Role::Manager, Role::Director] {
            assert!(!role.grants(Capability::Override), "{role:?} must not override");
        }
        assert!(Role::Master.grants(Capability::Override));
    }

    #[test]
    fn requesters_cannot_reject_an_approved_quote() {
        assert!(!Role::Requester.grants(Capability::RejectApprovedQuote));
        assert!(Role::Manager.grants(Capability::RejectApprovedQuote));
        assert!(Role::Director.grants(Capability::RejectApprovedQuote));
    }

    #[test]
    fn actor_capabilities_are_the_union_of_its_roles() {
        let actor = Actor::new(UserId(4), [Role::Manager, Role::Director]);

        assert!(actor.can(Capability::ApproveAsManager));
        assert!(actor.can(Capability::ApproveAsDirector));
        assert!(!actor.can(Capability::Override));
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(Role::parse(" Master "), Some(Role::Master));
        assert_eq!(Role::parse("diretor"), None);
    }
}
