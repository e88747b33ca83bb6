//! Maintains the per-`(Tenant, bbb_origin, bbb_origin_server_name)` `Stats`
//! snapshot a background sweep rebuilds from live meetings, and serializes
//! it for the `/b3lb/stats` endpoint.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use b3lb_core::error::Result;
use b3lb_storage::Store;

#[derive(Debug, Default, Clone)]
struct Accumulator {
    attendees: i64,
    meetings: i64,
    listener_count: i64,
    voice_participant_count: i64,
    moderator_count: i64,
    video_count: i64,
}

/// Scans every live Meeting under a Tenant, excluding meetings whose Node
/// is currently errored, grouped by origin/server name, and upserts one
/// `Stats` row per group.
pub fn recompute_tenant_stats(store: &Store, tenant_uuid: Uuid) -> Result<()> {
    let meetings = store.list_meetings_with_node_status_by_tenant(tenant_uuid)?;

    let mut groups: HashMap<(String, String), Accumulator> = HashMap::new();
    for (meeting, node_has_errors) in meetings {
        if node_has_errors {
            continue;
        }
        let key = (meeting.bbb_origin.clone(), meeting.bbb_origin_server_name.clone());
        let acc = groups.entry(key).or_default();
        acc.meetings += 1;
        acc.attendees += meeting.attendees;
        acc.listener_count += meeting.listener_count;
        acc.voice_participant_count += meeting.voice_participant_count;
        acc.moderator_count += meeting.moderator_count;
        acc.video_count += meeting.video_count;
    }

    for ((bbb_origin, bbb_origin_server_name), acc) in groups {
        store.upsert_stats(&b3lb_core::model::Stats {
            uuid: Uuid::new_v4(),
            tenant_uuid: Some(tenant_uuid),
            bbb_origin,
            bbb_origin_server_name,
            attendees: acc.attendees,
            meetings: acc.meetings,
            listener_count: acc.listener_count,
            voice_participant_count: acc.voice_participant_count,
            moderator_count: acc.moderator_count,
            video_count: acc.video_count,
        })?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub bbb_origin: String,
    pub bbb_origin_server_name: String,
    pub attendees: i64,
    pub meetings: i64,
    pub listener_count: i64,
    pub voice_participant_count: i64,
    pub moderator_count: i64,
    pub video_count: i64,
}

pub fn tenant_stats_json(store: &Store, tenant_uuid: Uuid) -> Result<Vec<StatsSnapshot>> {
    Ok(store
        .get_stats_by_tenant(tenant_uuid)?
        .into_iter()
        .map(|s| StatsSnapshot {
            bbb_origin: s.bbb_origin,
            bbb_origin_server_name: s.bbb_origin_server_name,
            attendees: s.attendees,
            meetings: s.meetings,
            listener_count: s.listener_count,
            voice_participant_count: s.voice_participant_count,
            moderator_count: s.moderator_count,
            video_count: s.video_count,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use b3lb_core::model::{Cluster, Meeting, Node, Secret, Tenant};
    use b3lb_core::signing::ShaAlgorithm;
    use chrono::Utc;

    fn seed(store: &Store) -> (Uuid, Uuid) {
        let cluster = Cluster {
            uuid: Uuid::new_v4(),
            name: "c".into(),
            hash_algorithm: ShaAlgorithm::Sha256,
            ..Default::default()
        };
        store.insert_cluster(&cluster).unwrap();

        let conn = store.get_connection().unwrap();
        let cluster_group_uuid = Uuid::new_v4();
        conn.execute(
            "INSERT INTO cluster_groups (uuid, name) VALUES (?1, 'g')",
            [cluster_group_uuid.to_string()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO cluster_group_relations (uuid, cluster_group_uuid, cluster_uuid) VALUES (?1, ?2, ?3)",
            rusqlite::params![Uuid::new_v4().to_string(), cluster_group_uuid.to_string(), cluster.uuid.to_string()],
        )
        .unwrap();
        drop(conn);

        let tenant = Tenant {
            uuid: Uuid::new_v4(),
            slug: "ACME".into(),
            description: String::new(),
            cluster_group_uuid,
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
        store.insert_tenant(&tenant).unwrap();
        store.insert_secret(&secret).unwrap();

        let healthy_node = Node {
            uuid: Uuid::new_v4(),
            cluster_uuid: cluster.uuid,
            slug: "n1".into(),
            domain: "n1.example.com".into(),
            secret: "ns".into(),
            attendees: 0,
            meetings: 0,
            cpu_load: 0,
            has_errors: false,
            maintenance: false,
        };
        let errored_node = Node {
            uuid: Uuid::new_v4(),
            cluster_uuid: cluster.uuid,
            slug: "n2".into(),
            domain: "n2.example.com".into(),
            secret: "ns".into(),
            attendees: 0,
            meetings: 0,
            cpu_load: 0,
            has_errors: true,
            maintenance: false,
        };
        store.insert_node(&healthy_node).unwrap();
        store.insert_node(&errored_node).unwrap();

        store
            .upsert_meeting(&Meeting {
                id: "m-healthy".into(),
                secret_uuid: secret.uuid,
                node_uuid: healthy_node.uuid,
                room_name: "room".into(),
                created_at: Utc::now(),
                attendees: 5,
                listener_count: 1,
                voice_participant_count: 1,
                moderator_count: 1,
                video_count: 0,
                bbb_origin: "greenlight".into(),
                bbb_origin_server_name: "gl1".into(),
                end_callback_url: String::new(),
                nonce: "n".into(),
            })
            .unwrap();
        store
            .upsert_meeting(&Meeting {
                id: "m-errored".into(),
                secret_uuid: secret.uuid,
                node_uuid: errored_node.uuid,
                room_name: "room".into(),
                created_at: Utc::now(),
                attendees: 9,
                listener_count: 9,
                voice_participant_count: 9,
                moderator_count: 9,
                video_count: 9,
                bbb_origin: "greenlight".into(),
                bbb_origin_server_name: "gl1".into(),
                end_callback_url: String::new(),
                nonce: "n".into(),
            })
            .unwrap();

        (tenant.uuid, secret.uuid)
    }

    #[test]
    fn excludes_meetings_on_errored_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let (tenant_uuid, _secret_uuid) = seed(&store);

        recompute_tenant_stats(&store, tenant_uuid).unwrap();
        let snapshot = tenant_stats_json(&store, tenant_uuid).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].attendees, 5);
        assert_eq!(snapshot[0].meetings, 1);
    }
}
