//! Resolves an inbound request's host + path into a `(Tenant, Secret)` pair.
//!
//! A tenant is addressed by `<slug>[-<sub_id>].<base_domain>` in the `Host`
//! header, or by `/<SLUG>[-<sub_id>]/...` in the path when the deployment
//! fronts every tenant behind one domain. `sub_id` selects a secret within
//! the tenant (0 is the tenant-wide aggregation root); omitted, it defaults
//! to 0.

use std::sync::OnceLock;

use b3lb_core::error::{B3lbError, Result};
use b3lb_core::model::{Secret, Tenant};
use b3lb_core::validation::{validate_sub_id, validate_tenant_slug};
use b3lb_storage::Store;
use regex::Regex;

fn host_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z]{2,10})(?:-(\d{1,3}))?\.").unwrap())
}

fn path_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/([A-Za-z]{2,10})(?:-(\d{1,3}))?/").unwrap())
}

#[derive(Debug, Clone)]
pub struct ResolvedTenant {
    pub tenant: Tenant,
    pub secret: Secret,
}

/// Tries the `Host` header first, then the request path, matching whichever
/// deployment style is in front of this process.
pub fn resolve(store: &Store, host: Option<&str>, path: &str) -> Result<ResolvedTenant> {
    let (slug, sub_id) = host
        .and_then(|h| captures_from(host_pattern(), h))
        .or_else(|| captures_from(path_pattern(), path))
        .ok_or_else(|| B3lbError::NotFound("no tenant slug in request".into()))?;

    let slug = slug.to_uppercase();
    validate_tenant_slug(&slug)?;
    validate_sub_id(sub_id)?;

    let tenant = store.get_tenant_by_slug(&slug)?;
    let secret = store.get_secret_by_tenant_and_subid(tenant.uuid, sub_id)?;

    Ok(ResolvedTenant { tenant, secret })
}

fn captures_from(re: &Regex, haystack: &str) -> Option<(String, i32)> {
    let caps = re.captures(haystack)?;
    let slug = caps.get(1)?.as_str().to_string();
    let sub_id = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .unwrap_or(0);
    Some((slug, sub_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_pattern_extracts_slug_and_sub_id() {
        assert_eq!(
            captures_from(host_pattern(), "acme-7.bbbconf.de"),
            Some(("acme".into(), 7))
        );
        assert_eq!(
            captures_from(host_pattern(), "acme.bbbconf.de"),
            Some(("acme".into(), 0))
        );
    }

    #[test]
    fn path_pattern_extracts_slug_and_sub_id() {
        assert_eq!(
            captures_from(path_pattern(), "/ACME-3/bigbluebutton/api/create"),
            Some(("ACME".into(), 3))
        );
    }

    #[test]
    fn neither_pattern_matches_garbage() {
        assert!(captures_from(host_pattern(), "localhost").is_none());
        assert!(captures_from(path_pattern(), "/bigbluebutton/api/create").is_none());
    }
}
