//! Permission checks.
//!
//! `can_access_action` is the only place authorization is decided. Route
//! extractors, per-item capability flags and the client all call it.

use super::types::{Action, Identity};

/// True iff some role of `identity` grants exactly `action` on `resource`.
pub fn can_access_action(identity: &Identity, resource: &str, action: Action) -> bool {
    identity
        .roles
        .iter()
        .flat_map(|role| role.permissions.iter())
        .any(|p| p.action == action && p.resource == resource)
}

/// A compile-time permission requirement, used by the `Authorize` extractor.
pub trait PermissionConstraint {
    const RESOURCE: &'static str;
    const ACTION: Action;
}

macro_rules! permission_constraint {
    ($(#[$meta:meta])* $name:ident, $resource:literal, $action:ident) => {
        $(#[$meta])*
        pub struct $name;

        impl PermissionConstraint for $name {
            const RESOURCE: &'static str = $resource;
            const ACTION: Action = Action::$action;
        }
    };
}

permission_constraint!(CreateTickets, "tickets", Create);
permission_constraint!(ReadTickets, "tickets", Read);
permission_constraint!(UpdateTickets, "tickets", Update);
permission_constraint!(DeleteTickets, "tickets", Delete);
permission_constraint!(CreateUsers, "users", Create);
permission_constraint!(ReadUsers, "users", Read);
permission_constraint!(UpdateUsers, "users", Update);
permission_constraint!(DeleteUsers, "users", Delete);
permission_constraint!(
    /// Listing roles and their permissions.
    ReadRoles,
    "roles",
    Read
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::{Permission, Role};

    fn identity(roles: Vec<Role>) -> Identity {
        Identity {
            id: 1,
            uuid: "uuid-1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            active: true,
            roles,
        }
    }

    fn role(name: &str, permissions: &[(&str, Action)]) -> Role {
        Role {
            name: name.into(),
            permissions: permissions
                .iter()
                .map(|(r, a)| Permission::new(*r, *a))
                .collect(),
        }
    }

    #[test]
    fn test_exact_match_grants() {
        let id = identity(vec![role("member", &[("tickets", Action::Read)])]);
        assert!(can_access_action(&id, "tickets", Action::Read));
    }

    #[test]
    fn test_other_action_denied() {
        let id = identity(vec![role("member", &[("tickets", Action::Read)])]);
        assert!(!can_access_action(&id, "tickets", Action::Delete));
    }

    #[test]
    fn test_unknown_resource_denied() {
        let id = identity(vec![role("member", &[("tickets", Action::Read)])]);
        assert!(!can_access_action(&id, "invoices", Action::Read));
        assert!(!can_access_action(&id, "", Action::Read));
    }

    #[test]
    fn test_no_prefix_or_case_matching() {
        let id = identity(vec![role("member", &[("tickets", Action::Read)])]);
        assert!(!can_access_action(&id, "ticket", Action::Read));
        assert!(!can_access_action(&id, "Tickets", Action::Read));
        assert!(!can_access_action(&id, "tickets/1", Action::Read));
    }

    #[test]
    fn test_no_roles_denied() {
        let id = identity(vec![]);
        assert!(!can_access_action(&id, "tickets", Action::Read));
    }

    #[test]
    fn test_permission_from_any_role() {
        let id = identity(vec![
            role("viewer", &[("tickets", Action::Read)]),
            role("editor", &[("tickets", Action::Update)]),
        ]);
        assert!(can_access_action(&id, "tickets", Action::Read));
        assert!(can_access_action(&id, "tickets", Action::Update));
        assert!(!can_access_action(&id, "tickets", Action::Create));
    }

    #[test]
    fn test_identity_can_delegates() {
        let id = identity(vec![role("viewer", &[("tickets", Action::Read)])]);
        for action in [Action::Create, Action::Read, Action::Update, Action::Delete] {
            assert_eq!(
                id.can("tickets", action),
                can_access_action(&id, "tickets", action)
            );
        }
    }

    #[test]
    fn test_constraints() {
        assert_eq!(DeleteTickets::RESOURCE, "tickets");
        assert_eq!(DeleteTickets::ACTION, Action::Delete);
        assert_eq!(ReadRoles::RESOURCE, "roles");
    }
}
