//! Operator identities and who may use the service.
//!
//! Login itself happens elsewhere; this module only decides whether an
//! identity the provider vouched for becomes a [`Principal`].

use std::collections::HashSet;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the identity provider reports after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub email: String,
    pub name: String,
    /// Hosted workspace domain, when the provider reports one.
    #[serde(default)]
    pub domain: Option<String>,
}

impl Identity {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// An authorized operator. Every service operation requires one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("Access denied: {email} is not authorized to use this application")]
    NotAuthorized { email: String },

    #[error("Access denied: {email} is not in the {expected} workspace")]
    WrongDomain { email: String, expected: String },
}

/// Email allowlist, admin list and optional workspace domain.
///
/// Emails compare case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    authorized: HashSet<String>,
    admins: HashSet<String>,
    workspace_domain: Option<String>,
}

impl AccessPolicy {
    pub fn new<A, B>(authorized: A, admins: B) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        B: IntoIterator,
        B::Item: AsRef<str>,
    {
        Self {
            authorized: normalize(authorized),
            admins: normalize(admins),
            workspace_domain: None,
        }
    }

    pub fn with_workspace_domain(mut self, domain: impl Into<String>) -> Self {
        self.workspace_domain = Some(domain.into().trim().to_ascii_lowercase());
        self
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from `AUTHORIZED_EMAILS`, `ADMIN_EMAILS` (comma separated) and
    /// `WORKSPACE_DOMAIN`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let list = |key: &str| {
            lookup(key)
                .map(|v| v.split(',').map(str::to_string).collect::<Vec<_>>())
                .unwrap_or_default()
        };

        let mut policy = Self::new(list("AUTHORIZED_EMAILS"), list("ADMIN_EMAILS"));
        if let Some(domain) = lookup("WORKSPACE_DOMAIN").filter(|d| !d.trim().is_empty()) {
            policy = policy.with_workspace_domain(domain);
        }
        if policy.authorized.is_empty() {
            warn!("AUTHORIZED_EMAILS is empty, every login will be denied");
        }
        policy
    }

    pub fn authorized_count(&self) -> usize {
        self.authorized.len()
    }

    pub fn is_authorized(&self, email: &str) -> bool {
        self.authorized.contains(&email.trim().to_ascii_lowercase())
    }

    pub fn is_admin(&self, email: &str) -> bool {
        self.admins.contains(&email.trim().to_ascii_lowercase())
    }

    /// Turn a provider identity into a principal, or refuse it.
    pub fn authorize(&self, identity: &Identity) -> Result<Principal, AccessDenied> {
        if !self.is_authorized(&identity.email) {
            warn!("Login denied for {}: not on the allowlist", identity.email);
            return Err(AccessDenied::NotAuthorized {
                email: identity.email.clone(),
            });
        }

        if let Some(expected) = &self.workspace_domain {
            let domain = identity.domain.as_deref().map(str::to_ascii_lowercase);
            if domain.as_deref() != Some(expected.as_str()) {
                warn!(
                    "Login denied for {}: domain {:?} is not {}",
                    identity.email, identity.domain, expected
                );
                return Err(AccessDenied::WrongDomain {
                    email: identity.email.clone(),
                    expected: expected.clone(),
                });
            }
        }

        info!("Login accepted for {}", identity.email);
        Ok(Principal {
            email: identity.email.clone(),
            name: identity.name.clone(),
            is_admin: self.is_admin(&identity.email),
        })
    }
}

fn normalize<I>(emails: I) -> HashSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    emails
        .into_iter()
        .map(|e| e.as_ref().trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AccessPolicy {
        AccessPolicy::new(["Ops@Example.edu", "tech@example.edu"], ["ops@example.edu"])
    }

    #[test]
    fn test_allowlist_is_case_insensitive() {
        let principal = policy()
            .authorize(&Identity::new("OPS@example.edu", "Ops"))
            .unwrap();
        assert!(principal.is_admin);
        assert_eq!(principal.email, "OPS@example.edu");

        let tech = policy()
            .authorize(&Identity::new("tech@example.edu", "Tech"))
            .unwrap();
        assert!(!tech.is_admin);
    }

    #[test]
    fn test_unknown_email_is_denied() {
        assert_eq!(
            policy().authorize(&Identity::new("guest@example.edu", "Guest")),
            Err(AccessDenied::NotAuthorized {
                email: "guest@example.edu".into()
            })
        );
    }

    #[test]
    fn test_workspace_domain_is_enforced() {
        let policy = policy().with_workspace_domain("example.edu");
        assert!(policy
            .authorize(&Identity::new("tech@example.edu", "Tech").with_domain("example.edu"))
            .is_ok());
        assert!(matches!(
            policy.authorize(&Identity::new("tech@example.edu", "Tech")),
            Err(AccessDenied::WrongDomain { .. })
        ));
    }

    #[test]
    fn test_from_lookup_splits_lists() {
        let policy = AccessPolicy::from_lookup(|key| match key {
            "AUTHORIZED_EMAILS" => Some("a@x.org, b@x.org,,".into()),
            "ADMIN_EMAILS" => Some("b@x.org".into()),
            _ => None,
        });
        assert_eq!(policy.authorized_count(), 2);
        assert!(policy.is_admin("B@x.org"));
        assert!(!policy.is_admin("a@x.org"));
    }

    #[test]
    fn test_principal_serializes_camel_case() {
        let principal = Principal {
            email: "a@x.org".into(),
            name: "A".into(),
            is_admin: true,
        };
        let json = serde_json::to_value(&principal).unwrap();
        assert_eq!(json["isAdmin"], true);
    }
}
