//! Picks a Node to host a new meeting: gate on tenant/secret attendee and
//! meeting limits, then choose uniformly at random among the least-loaded
//! eligible Nodes in the tenant's cluster group.

use rand::Rng;

use b3lb_core::error::{B3lbError, Result};
use b3lb_core::model::{Cluster, Node, Secret, Tenant};

/// A Node is eligible if it isn't in maintenance or erroring (`load` isn't
/// negative) and is attached to one of the tenant's cluster group's
/// clusters. Among nodes tied at the lowest load, one is picked at random
/// rather than deterministically, so load doesn't pile up on whichever
/// node happens to sort first.
pub fn select<'a>(nodes: &'a [(Node, Cluster)]) -> Option<&'a Node> {
    let mut lowest = i64::MAX;
    let mut candidates: Vec<&'a Node> = Vec::new();

    for (node, cluster) in nodes {
        let load = node.load(cluster);
        if load < 0 {
            continue;
        }
        if load < lowest {
            lowest = load;
            candidates.clear();
            candidates.push(node);
        } else if load == lowest {
            candidates.push(node);
        }
    }

    if candidates.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..candidates.len());
    Some(candidates[index])
}

/// Admits a new meeting only if neither the secret's nor the tenant's
/// attendee/meeting limits (0 = unlimited) would be exceeded. `current_*`
/// reflect the secret's existing meetings before this one is admitted.
pub fn check_limits(
    tenant: &Tenant,
    secret: &Secret,
    current_meetings: i64,
    current_attendees: i64,
) -> Result<()> {
    let meeting_limit = effective_limit(secret.meeting_limit, tenant.meeting_limit);
    if meeting_limit > 0 && current_meetings >= meeting_limit {
        return Err(B3lbError::LimitFailure("meeting limit reached".into()));
    }

    let attendee_limit = effective_limit(secret.attendee_limit, tenant.attendee_limit);
    if attendee_limit > 0 && current_attendees >= attendee_limit {
        return Err(B3lbError::LimitFailure("attendee limit reached".into()));
    }

    Ok(())
}

/// 0 means unlimited on either side; the tighter non-zero bound wins.
pub(crate) fn effective_limit(secret_limit: i64, tenant_limit: i64) -> i64 {
    match (secret_limit, tenant_limit) {
        (0, t) => t,
        (s, 0) => s,
        (s, t) => s.min(t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn node(load_inputs: (i64, i64, i64, bool, bool)) -> (Node, Cluster) {
        let cluster = Cluster::default();
        let node = Node {
            uuid: Uuid::new_v4(),
            cluster_uuid: cluster.uuid,
            slug: "n".into(),
            domain: "n.example.com".into(),
            secret: "s".into(),
            attendees: load_inputs.0,
            meetings: load_inputs.1,
            cpu_load: load_inputs.2,
            has_errors: load_inputs.3,
            maintenance: load_inputs.4,
        };
        (node, cluster)
    }

    #[test]
    fn selects_least_loaded_eligible_node() {
        let nodes = vec![
            node((10, 2, 1000, false, false)),
            node((1, 0, 500, false, false)),
            node((0, 0, 0, true, false)),
        ];
        let selected = select(&nodes).unwrap();
        assert_eq!(selected.attendees, 1);
    }

    #[test]
    fn excludes_maintenance_and_errored_nodes() {
        let nodes = vec![node((0, 0, 0, true, false)), node((0, 0, 0, false, true))];
        assert!(select(&nodes).is_none());
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let tenant = Tenant {
            uuid: Uuid::nil(),
            slug: "A".into(),
            description: String::new(),
            cluster_group_uuid: Uuid::nil(),
            attendee_limit: 0,
            meeting_limit: 0,
            recording_enabled: false,
            records_hold_time: 0,
            stats_token: Uuid::nil(),
        };
        let secret = Secret {
            uuid: Uuid::nil(),
            tenant_uuid: Uuid::nil(),
            description: String::new(),
            sub_id: 0,
            secret: String::new(),
            secret2: String::new(),
            attendee_limit: 0,
            meeting_limit: 0,
            recording_enabled: false,
            records_hold_time: 0,
        };
        assert!(check_limits(&tenant, &secret, 1_000_000, 1_000_000).is_ok());
    }

    #[test]
    fn nonzero_secret_limit_is_enforced() {
        let tenant = Tenant {
            uuid: Uuid::nil(),
            slug: "A".into(),
            description: String::new(),
            cluster_group_uuid: Uuid::nil(),
            attendee_limit: 0,
            meeting_limit: 0,
            recording_enabled: false,
            records_hold_time: 0,
            stats_token: Uuid::nil(),
        };
        let secret = Secret {
            uuid: Uuid::nil(),
            tenant_uuid: Uuid::nil(),
            description: String::new(),
            sub_id: 0,
            secret: String::new(),
            secret2: String::new(),
            attendee_limit: 0,
            meeting_limit: 2,
            recording_enabled: false,
            records_hold_time: 0,
        };
        assert!(check_limits(&tenant, &secret, 2, 0).is_err());
        assert!(check_limits(&tenant, &secret, 1, 0).is_ok());
    }
}
