/// Classification of a request path. Zones are mutually exclusive; every
/// path maps to exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Path under the admin-only API prefix.
    AdminApi,
    /// Path under the customer API prefix.
    CustomerApi,
    /// Any other API path. Handlers behind this prefix do their own
    /// authorization.
    OtherApi,
    /// An allow-listed non-API path, reachable without a session.
    PublicPage,
    /// Any other non-API path.
    PrivatePage,
}

/// Facts about a request path that the decision rules need. Computed once
/// per request by [`ZoneRules::classify`].
#[derive(Debug, Clone, Copy)]
pub struct PathFacts {
    pub zone: Zone,
    pub in_admin_section: bool,
    pub is_login_path: bool,
}

/// The fixed prefix table driving classification. Built from configuration
/// at startup and never changed afterwards.
#[derive(Debug, Clone)]
pub struct ZoneRules {
    pub admin_api_prefix: String,
    pub customer_api_prefix: String,
    pub api_prefix: String,
    pub admin_section: String,
    pub login_path: String,
    pub public_prefixes: Vec<String>,
}

impl ZoneRules {
    pub fn classify(&self, path: &str) -> PathFacts {
        PathFacts {
            zone: self.zone_of(path),
            in_admin_section: path.starts_with(&self.admin_section),
            is_login_path: path == self.login_path,
        }
    }

    /// Most specific first: the admin and customer API prefixes live under
    /// the generic API prefix, and API prefixes win over page rules.
    fn zone_of(&self, path: &str) -> Zone {
        if path.starts_with(&self.admin_api_prefix) {
            return Zone::AdminApi;
        }
        if path.starts_with(&self.customer_api_prefix) {
            return Zone::CustomerApi;
        }
        if path.starts_with(&self.api_prefix) {
            return Zone::OtherApi;
        }
        if path == "/" {
            return Zone::PublicPage;
        }
        // The root path is public by exact match only. Matching "/" as a
        // prefix would make every path public.
        if self
            .public_prefixes
            .iter()
            .any(|p| p != "/" && path.starts_with(p.as_str()))
        {
            return Zone::PublicPage;
        }

        Zone::PrivatePage
    }
}

#[cfg(test)]
mod tests {
    use once_cell::sync::Lazy;

    use crate::config::ZonesConfig;

    use super::*;

    static RULES: Lazy<ZoneRules> = Lazy::new(|| ZonesConfig::default().build_rules());

    #[test]
    fn test_api_zones() {
        assert_eq!(RULES.zone_of("/api/admin/users"), Zone::AdminApi);
        assert_eq!(RULES.zone_of("/api/admin"), Zone::AdminApi);
        assert_eq!(RULES.zone_of("/api/customer/payments"), Zone::CustomerApi);
        assert_eq!(RULES.zone_of("/api/tasks"), Zone::OtherApi);
        assert_eq!(RULES.zone_of("/api"), Zone::OtherApi);
    }

    #[test]
    fn test_page_zones() {
        assert_eq!(RULES.zone_of("/"), Zone::PublicPage);
        assert_eq!(RULES.zone_of("/signup"), Zone::PublicPage);
        assert_eq!(RULES.zone_of("/auth/callback?code=x"), Zone::PublicPage);
        assert_eq!(RULES.zone_of("/password-reset/step2"), Zone::PublicPage);
        assert_eq!(RULES.zone_of("/error"), Zone::PublicPage);

        assert_eq!(RULES.zone_of("/departments"), Zone::PrivatePage);
        assert_eq!(RULES.zone_of("/admin/users"), Zone::PrivatePage);
    }

    #[test]
    fn test_root_is_exact_match_only() {
        // "/admin" must not become public just because the allow list
        // contains "/".
        assert_eq!(RULES.zone_of("/admin"), Zone::PrivatePage);
        assert_eq!(RULES.zone_of("/s"), Zone::PrivatePage);
    }

    #[test]
    fn test_path_facts() {
        let facts = RULES.classify("/admin/finance");
        assert_eq!(facts.zone, Zone::PrivatePage);
        assert!(facts.in_admin_section);
        assert!(!facts.is_login_path);

        let facts = RULES.classify("/");
        assert_eq!(facts.zone, Zone::PublicPage);
        assert!(!facts.in_admin_section);
        assert!(facts.is_login_path);
    }
}
