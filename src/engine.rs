use log::debug;

use crate::identity::{IdentityRecord, Role, SessionState};
use crate::zone::{PathFacts, Zone};

pub const CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const CODE_FORBIDDEN: &str = "FORBIDDEN";

/// Outcome of gate evaluation for one request. Exactly one decision is
/// produced per request; the middleware applies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Let the request reach its handler unchanged.
    Allow,
    /// Send the caller somewhere else.
    Redirect {
        path: String,
        query: Vec<(String, String)>,
    },
    /// Refuse the request with a structured JSON error.
    Reject { status: u16, code: &'static str },
    /// Tear the session down at the backend, then redirect.
    ForceLogoutThenRedirect {
        path: String,
        query: Vec<(String, String)>,
    },
}

/// Everything the rule table needs to evaluate one request. Assembled by
/// the middleware; the engine itself performs no I/O.
#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub facts: PathFacts,
    pub session: SessionState,
    /// `None` covers both "no record exists" and "the lookup failed". The
    /// rules treat the two identically.
    pub identity: Option<IdentityRecord>,
    /// Redirect target for callers that do not belong where they are.
    pub login_path: String,
    /// Landing page for admin callers, the admin section root.
    pub admin_home: String,
}

impl DecisionInput {
    fn zone(&self) -> Zone {
        self.facts.zone
    }

    /// The role a caller must hold for the zone, if the zone restricts one.
    fn required_role(&self) -> Option<Role> {
        match self.facts.zone {
            Zone::AdminApi => Some(Role::Admin),
            Zone::CustomerApi => Some(Role::Customer),
            _ => None,
        }
    }

    fn is_role_api(&self) -> bool {
        self.required_role().is_some()
    }

    fn is_page(&self) -> bool {
        matches!(self.facts.zone, Zone::PublicPage | Zone::PrivatePage)
    }

    fn anonymous(&self) -> bool {
        matches!(self.session, SessionState::Absent)
    }

    fn identity_missing(&self) -> bool {
        self.identity.is_none()
    }

    fn inactive(&self) -> bool {
        matches!(self.identity, Some(record) if !record.is_active)
    }

    fn has_role(&self, role: Role) -> bool {
        matches!(self.identity, Some(record) if record.role == role)
    }

    fn has_required_role(&self) -> bool {
        match self.required_role() {
            Some(role) => self.has_role(role),
            None => true,
        }
    }
}

struct Rule {
    name: &'static str,
    applies: fn(&DecisionInput) -> bool,
    outcome: fn(&DecisionInput) -> Decision,
}

/// The ordered decision table. The first rule whose predicate holds wins,
/// so the order is part of the contract: several predicates overlap and the
/// earlier rule takes precedence. The final catch-all keeps [`decide`]
/// total over every input combination.
const RULES: &[Rule] = &[
    Rule {
        name: "api-anonymous",
        applies: |i| i.is_role_api() && i.anonymous(),
        outcome: |_| Decision::Reject {
            status: 401,
            code: CODE_UNAUTHORIZED,
        },
    },
    // A missing identity record and a deactivated account collapse into the
    // same teardown branch here. Inherited behavior; whether a dangling
    // session should really be treated like a deactivated account is an
    // open product question.
    Rule {
        name: "api-dead-identity",
        applies: |i| i.is_role_api() && (i.identity_missing() || i.inactive()),
        outcome: |i| Decision::ForceLogoutThenRedirect {
            path: i.login_path.clone(),
            query: Vec::new(),
        },
    },
    Rule {
        name: "api-wrong-role",
        applies: |i| i.is_role_api() && !i.has_required_role(),
        outcome: |_| Decision::Reject {
            status: 403,
            code: CODE_FORBIDDEN,
        },
    },
    Rule {
        name: "api-allow",
        applies: |i| i.is_role_api(),
        outcome: |_| Decision::Allow,
    },
    // Handlers behind the generic API prefix own their authorization.
    Rule {
        name: "api-open",
        applies: |i| i.zone() == Zone::OtherApi,
        outcome: |_| Decision::Allow,
    },
    Rule {
        name: "page-anonymous-public",
        applies: |i| i.is_page() && i.anonymous() && i.zone() == Zone::PublicPage,
        outcome: |_| Decision::Allow,
    },
    Rule {
        name: "page-anonymous-private",
        applies: |i| i.is_page() && i.anonymous(),
        outcome: |i| Decision::Redirect {
            path: i.login_path.clone(),
            query: Vec::new(),
        },
    },
    // Pages fail open when the identity record cannot be fetched, unlike
    // the API zones above, which fail closed. Inherited asymmetry, kept
    // on purpose.
    Rule {
        name: "page-missing-identity",
        applies: |i| i.is_page() && i.identity_missing(),
        outcome: |_| Decision::Allow,
    },
    Rule {
        name: "page-inactive",
        applies: |i| i.is_page() && i.inactive() && !i.facts.is_login_path,
        outcome: |i| Decision::ForceLogoutThenRedirect {
            path: i.login_path.clone(),
            query: vec![(String::from("reason"), String::from("inactive"))],
        },
    },
    Rule {
        name: "page-admin-on-public",
        applies: |i| i.is_page() && i.has_role(Role::Admin) && i.zone() == Zone::PublicPage,
        outcome: |i| Decision::Redirect {
            path: i.admin_home.clone(),
            query: Vec::new(),
        },
    },
    Rule {
        name: "page-admin-outside-admin",
        applies: |i| i.is_page() && i.has_role(Role::Admin) && !i.facts.in_admin_section,
        outcome: |i| Decision::Redirect {
            path: i.admin_home.clone(),
            query: Vec::new(),
        },
    },
    Rule {
        name: "page-non-admin-in-admin",
        applies: |i| i.is_page() && !i.has_role(Role::Admin) && i.facts.in_admin_section,
        outcome: |i| Decision::Redirect {
            path: i.login_path.clone(),
            query: Vec::new(),
        },
    },
    Rule {
        name: "allow",
        applies: |_| true,
        outcome: |_| Decision::Allow,
    },
];

/// Maps one request to one decision. Pure and reentrant; safe to call
/// concurrently for many simultaneous requests.
pub fn decide(input: &DecisionInput) -> Decision {
    for rule in RULES {
        if (rule.applies)(input) {
            debug!("Gate rule matched: {}", rule.name);
            return (rule.outcome)(input);
        }
    }

    // The table ends with a catch-all predicate, so this is unreachable.
    // Kept so the function stays total regardless of table edits.
    Decision::Allow
}
