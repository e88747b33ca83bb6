//! Rebuilds the cached `SecretMeetingList` XML that a `getMeetings` call
//! serves without fanning out to every Node on each request, and renders
//! the tenant-facing Prometheus text exposition from the stored `Metric`
//! rows.
//!
//! This is deliberately separate from ambient process metrics (`metrics.rs`
//! exposes those via the `prometheus` crate's own registry): these values
//! are per-tenant and persisted, so they're rendered straight from the
//! store instead of going through a process-global registry.

use b3lb_core::error::Result;
use b3lb_core::model::MetricName;
use b3lb_storage::Store;
use uuid::Uuid;

use crate::node_selector::effective_limit;
use crate::protocol::get_meetings_xml;

pub fn rebuild_secret_meeting_list(store: &Store, secret_uuid: Uuid) -> Result<()> {
    let meetings = store.list_meetings_by_secret(secret_uuid)?;
    let xml = get_meetings_xml(&meetings);
    store.upsert_secret_meeting_list(secret_uuid, &xml)?;
    Ok(())
}

fn metric_help(name: MetricName) -> &'static str {
    match name {
        MetricName::Attendees => "Current number of attendees across live meetings",
        MetricName::Listeners => "Current number of listen-only attendees across live meetings",
        MetricName::Voices => "Current number of voice participants across live meetings",
        MetricName::Videos => "Current number of webcam streams across live meetings",
        MetricName::Meetings => "Current number of live meetings",
        MetricName::AttendeesTotal => "Total number of attendees that ever joined",
        MetricName::MeetingsTotal => "Total number of meetings that were ever created",
        MetricName::MeetingDurationSecondsCount => "Total number of meetings that ended",
        MetricName::MeetingDurationSecondsSum => "Total duration in seconds of all meetings that ended",
        MetricName::AttendeeLimitHits => "Total number of times an attendee limit was hit on create",
        MetricName::MeetingLimitHits => "Total number of times a meeting limit was hit on create",
    }
}

/// One Prometheus text-exposition block: `# HELP`/`# TYPE` once, then every
/// sample for that metric with its own label set.
fn metric_block(name: MetricName, samples: &[(Vec<(&str, String)>, i64)]) -> String {
    let mut out = format!(
        "# HELP b3lb_{0} {1}\n# TYPE b3lb_{0} {2}\n",
        name.as_str(),
        metric_help(name),
        if name.is_gauge() { "gauge" } else { "counter" },
    );
    for (labels, value) in samples {
        if labels.is_empty() {
            out.push_str(&format!("b3lb_{} {}\n", name.as_str(), value));
        } else {
            let label_str = labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect::<Vec<_>>()
                .join(",");
            out.push_str(&format!("b3lb_{}{{{}}} {}\n", name.as_str(), label_str, value));
        }
    }
    out
}

/// Renders every metric scoped to a single secret, unlabeled (the caller
/// already knows which secret this snapshot belongs to from the request
/// path).
pub fn render_secret_metrics_text(store: &Store, secret_uuid: Uuid) -> Result<String> {
    let mut out = String::new();
    for name in MetricName::ALL {
        let value = store.get_metric(name, Some(secret_uuid), None)?;
        out.push_str(&metric_block(name, &[(Vec::new(), value)]));
    }
    Ok(out)
}

/// Renders every metric summed across all of a tenant's secrets, plus each
/// secret's effective attendee/meeting limit and the tenant's own.
pub fn render_tenant_metrics_text(store: &Store, tenant_uuid: Uuid) -> Result<String> {
    let tenant = store.get_tenant(tenant_uuid)?;
    let secrets = store.list_secrets_for_tenant(tenant_uuid)?;
    render_metrics_for_secrets(store, &secrets, std::slice::from_ref(&tenant))
}

/// Renders every metric summed across every secret in the deployment, plus
/// `bbb_node_load` samples for every Node (this is the only sample carrying
/// the `bbb_` prefix rather than `b3lb_`, matching the node-load gauge name
/// existing Grafana dashboards already watch for) and every
/// tenant/secret's effective limits.
pub fn render_global_metrics_text(store: &Store) -> Result<String> {
    let secrets = store.list_all_secrets()?;
    let tenants = store.list_all_tenants()?;

    let mut out = render_metrics_for_secrets(store, &secrets, &tenants)?;

    let mut load_samples = Vec::new();
    for node in store.list_all_nodes()? {
        let cluster = store.get_cluster(node.cluster_uuid)?;
        load_samples.push((
            vec![
                ("slug", node.slug.clone()),
                ("cluster", cluster.name.clone()),
            ],
            node.load(&cluster),
        ));
    }
    out.push_str("# HELP bbb_node_load Current computed load of a backend Node\n");
    out.push_str("# TYPE bbb_node_load gauge\n");
    for (labels, value) in load_samples {
        let label_str = labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&format!("bbb_node_load{{{}}} {}\n", label_str, value));
    }

    Ok(out)
}

/// Shared accumulation: sums the `ALL` metric set across `secrets`, then
/// appends per-secret and per-tenant `attendee_limit`/`meeting_limit`
/// gauges (not stored in the metrics table — derived live from
/// Tenant/Secret config, the way `node_selector::effective_limit` does).
fn render_metrics_for_secrets(
    store: &Store,
    secrets: &[b3lb_core::model::Secret],
    tenants: &[b3lb_core::model::Tenant],
) -> Result<String> {
    let mut out = String::new();
    for name in MetricName::ALL {
        let mut total = 0i64;
        for secret in secrets {
            total += store.get_metric(name, Some(secret.uuid), None)?;
        }
        out.push_str(&metric_block(name, &[(Vec::new(), total)]));
    }

    let tenant_for = |uuid: Uuid| tenants.iter().find(|t| t.uuid == uuid);

    let mut attendee_limit_samples = Vec::new();
    let mut meeting_limit_samples = Vec::new();
    for secret in secrets {
        let Some(tenant) = tenant_for(secret.tenant_uuid) else { continue };
        let labels = vec![("secret", secret.uuid.to_string()), ("tenant", tenant.slug.clone())];
        attendee_limit_samples.push((
            labels.clone(),
            effective_limit(secret.attendee_limit, tenant.attendee_limit),
        ));
        meeting_limit_samples.push((labels, effective_limit(secret.meeting_limit, tenant.meeting_limit)));
    }
    for tenant in tenants {
        let labels = vec![("tenant", tenant.slug.clone())];
        attendee_limit_samples.push((labels.clone(), tenant.attendee_limit));
        meeting_limit_samples.push((labels, tenant.meeting_limit));
    }

    out.push_str("# HELP b3lb_attendee_limit Effective attendee limit (0 = unlimited)\n");
    out.push_str("# TYPE b3lb_attendee_limit gauge\n");
    for (labels, value) in &attendee_limit_samples {
        let label_str = labels.iter().map(|(k, v)| format!("{k}=\"{v}\"")).collect::<Vec<_>>().join(",");
        out.push_str(&format!("b3lb_attendee_limit{{{}}} {}\n", label_str, value));
    }
    out.push_str("# HELP b3lb_meeting_limit Effective meeting limit (0 = unlimited)\n");
    out.push_str("# TYPE b3lb_meeting_limit gauge\n");
    for (labels, value) in &meeting_limit_samples {
        let label_str = labels.iter().map(|(k, v)| format!("{k}=\"{v}\"")).collect::<Vec<_>>().join(",");
        out.push_str(&format!("b3lb_meeting_limit{{{}}} {}\n", label_str, value));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use b3lb_core::model::{Meeting, Secret, Tenant};
    use chrono::Utc;

    fn seed(store: &Store) -> Uuid {
        let tenant = Tenant {
            uuid: Uuid::new_v4(),
            slug: "ACME".into(),
            description: String::new(),
            cluster_group_uuid: Uuid::new_v4(),
            attendee_limit: 0,
            meeting_limit: 0,
            recording_enabled: true,
            records_hold_time: 14,
            stats_token: Uuid::new_v4(),
        };
        let secret = Secret {
            uuid: Uuid::new_v4(),
            tenant_uuid: tenant.uuid,
            description: String::new(),
            sub_id: 0,
            secret: "s".into(),
            secret2: String::new(),
            attendee_limit: 0,
            meeting_limit: 0,
            recording_enabled: true,
            records_hold_time: 14,
        };
        let conn = store.get_connection().unwrap();
        conn.execute(
            "INSERT INTO cluster_groups (uuid, name) VALUES (?1, 'g')",
            [tenant.cluster_group_uuid.to_string()],
        )
        .unwrap();
        drop(conn);
        store.insert_tenant(&tenant).unwrap();
        store.insert_secret(&secret).unwrap();
        secret.uuid
    }

    #[test]
    fn rebuild_reflects_current_meetings() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let secret_uuid = seed(&store);

        rebuild_secret_meeting_list(&store, secret_uuid).unwrap();
        let cached = store.get_secret_meeting_list(secret_uuid).unwrap().unwrap();
        assert!(cached.contains("noMeetings"));

        store
            .upsert_meeting(&Meeting {
                id: "m1".into(),
                secret_uuid,
                node_uuid: Uuid::new_v4(),
                room_name: "room".into(),
                created_at: Utc::now(),
                attendees: 2,
                listener_count: 0,
                voice_participant_count: 0,
                moderator_count: 1,
                video_count: 0,
                bbb_origin: String::new(),
                bbb_origin_server_name: String::new(),
                end_callback_url: String::new(),
                nonce: "n".into(),
            })
            .unwrap();

        rebuild_secret_meeting_list(&store, secret_uuid).unwrap();
        let cached = store.get_secret_meeting_list(secret_uuid).unwrap().unwrap();
        assert!(cached.contains("m1"));
    }

    #[test]
    fn metrics_text_lists_every_metric_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let secret_uuid = Uuid::new_v4();
        let text = render_secret_metrics_text(&store, secret_uuid).unwrap();
        assert!(text.contains("b3lb_attendees_total 0"));
    }
}
