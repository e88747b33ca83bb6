//! Applies a tenant's configured `Parameter` rows (BLOCK/SET/OVERRIDE) to an
//! inbound request's query parameters before it is forwarded to a Node.
//!
//! - BLOCK drops the parameter entirely, regardless of what the client sent.
//! - SET fills in the tenant's value only if the client didn't send one.
//! - OVERRIDE replaces whatever the client sent unconditionally.
//!
//! Values are additionally checked against the per-parameter format regex;
//! a client-supplied value that fails validation is dropped rather than
//! forwarded malformed.

use b3lb_core::model::{Parameter, ParameterMode};
use b3lb_core::parameters::regex_for_parameter;

/// Applies policy to an ordered parameter list, returning the list to
/// forward. `whitelist` further restricts which parameter names survive at
/// all (the `create`/`join` endpoint whitelists).
pub fn apply(
    mut params: Vec<(String, String)>,
    policies: &[Parameter],
    whitelist: &[&str],
    force_drop: &[&str],
) -> Vec<(String, String)> {
    params.retain(|(k, _)| whitelist.contains(&k.as_str()) && !force_drop.contains(&k.as_str()));
    params.retain(|(k, v)| regex_for_parameter(k).is_match(v));

    for policy in policies {
        match policy.mode {
            ParameterMode::Block => {
                params.retain(|(k, _)| k != &policy.parameter);
            }
            ParameterMode::Set => {
                if !params.iter().any(|(k, _)| k == &policy.parameter) {
                    if let Some(value) = &policy.value {
                        params.push((policy.parameter.clone(), value.clone()));
                    }
                }
            }
            ParameterMode::Override => {
                params.retain(|(k, _)| k != &policy.parameter);
                if let Some(value) = &policy.value {
                    params.push((policy.parameter.clone(), value.clone()));
                }
            }
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn param(name: &str, mode: ParameterMode, value: Option<&str>) -> Parameter {
        Parameter {
            tenant_uuid: Uuid::nil(),
            parameter: name.into(),
            mode,
            value: value.map(String::from),
        }
    }

    #[test]
    fn block_drops_client_value() {
        let params = vec![("record".into(), "true".into())];
        let policies = vec![param("record", ParameterMode::Block, None)];
        let out = apply(params, &policies, &["record"], &[]);
        assert!(out.is_empty());
    }

    #[test]
    fn set_only_fills_gaps() {
        let params = vec![];
        let policies = vec![param("welcome", ParameterMode::Set, Some("hi"))];
        let out = apply(params, &policies, &["welcome"], &[]);
        assert_eq!(out, vec![("welcome".to_string(), "hi".to_string())]);
    }

    #[test]
    fn override_replaces_client_value() {
        let params = vec![("maxParticipants".into(), "5".into())];
        let policies = vec![param("maxParticipants", ParameterMode::Override, Some("10"))];
        let out = apply(params, &policies, &["maxParticipants"], &[]);
        assert_eq!(out, vec![("maxParticipants".to_string(), "10".to_string())]);
    }

    #[test]
    fn invalid_value_is_dropped_before_policy() {
        let params = vec![("record".into(), "not-a-bool".into())];
        let out = apply(params, &[], &["record"], &[]);
        assert!(out.is_empty());
    }

    #[test]
    fn force_drop_wins_over_whitelist() {
        let params = vec![("dialNumber".into(), "12345".into())];
        let out = apply(params, &[], &["dialNumber"], &["dialNumber"]);
        assert!(out.is_empty());
    }
}
