//! Periodically polls every Node: CPU load from `/b3lb/load`, the full
//! `getMeetings` census from the backend protocol, reconciles that census
//! against the Meeting rows b3lb itself created, and refreshes the
//! per-secret live gauges and cached meeting-list XML.
//!
//! A node that fails to respond within the configured timeout is marked
//! `has_errors` rather than dropped, so it falls out of node-selector
//! eligibility without losing its historical row.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use b3lb_core::model::{Cluster, Node};
use b3lb_core::signing::sign_outbound;
use b3lb_storage::Store;

use crate::{aggregation, counters};

/// A meeting is considered gone-for-good once it's missing from a census
/// for longer than this without reappearing — short enough that a single
/// slow poll cycle doesn't falsely retire it.
const MEETING_GONE_GRACE_SECONDS: i64 = 5;

/// Meetings that ended in under this long aren't counted toward the
/// duration histogram — almost certainly a test room or a misclick.
const MEETING_DURATION_CEILING_SECONDS: i64 = 43_200;

#[derive(Debug, Deserialize, Default)]
struct MeetingsResponse {
    #[serde(default)]
    meetings: MeetingsList,
}

#[derive(Debug, Deserialize, Default)]
struct MeetingsList {
    #[serde(default, rename = "meeting")]
    meeting: Vec<MeetingEntry>,
}

#[derive(Debug, Deserialize, Default)]
struct MeetingEntry {
    #[serde(default, rename = "meetingID")]
    meeting_id: String,
    #[serde(default, rename = "participantCount")]
    participant_count: i64,
    #[serde(default, rename = "listenerCount")]
    listener_count: i64,
    #[serde(default, rename = "voiceParticipantCount")]
    voice_participant_count: i64,
    #[serde(default, rename = "moderatorCount")]
    moderator_count: i64,
    #[serde(default, rename = "videoCount")]
    video_count: i64,
    #[serde(default, rename = "isBreakout")]
    is_breakout: String,
    #[serde(default)]
    metadata: MeetingMetadata,
}

#[derive(Debug, Deserialize, Default)]
struct MeetingMetadata {
    #[serde(default, rename = "bbb-origin")]
    bbb_origin: Option<String>,
    #[serde(default, rename = "bbb-origin-server-name")]
    bbb_origin_server_name: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NodeSnapshot {
    pub meetings: i64,
    pub attendees: i64,
    pub listeners: i64,
    pub voices: i64,
    pub moderators: i64,
    pub videos: i64,
}

/// Per-meeting counters pulled out of a census, keyed by `meetingID`, used
/// to reconcile b3lb's own Meeting rows regardless of whether the meeting
/// counted toward the node-level snapshot (breakout meetings do appear
/// here even though they're excluded from [`NodeSnapshot`]).
#[derive(Debug, Clone, Default)]
struct MeetingCensusEntry {
    participant_count: i64,
    listener_count: i64,
    voice_participant_count: i64,
    moderator_count: i64,
    video_count: i64,
    bbb_origin: String,
    bbb_origin_server_name: String,
}

pub struct NodePoller {
    client: reqwest::Client,
    store: Store,
    request_timeout: Duration,
}

impl NodePoller {
    pub fn new(store: Store, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client");
        Self {
            client,
            store,
            request_timeout,
        }
    }

    pub async fn poll_once(&self) {
        let nodes = match self.store.list_all_nodes() {
            Ok(n) => n,
            Err(e) => {
                tracing::error!("failed to list nodes for polling: {e}");
                return;
            }
        };

        for node in nodes {
            let cluster = match self.store.get_cluster(node.cluster_uuid) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("node {} references unknown cluster: {e}", node.slug);
                    continue;
                }
            };
            self.poll_node(&node, &cluster).await;
        }
    }

    async fn poll_node(&self, node: &Node, cluster: &Cluster) {
        let cpu_load = self.fetch_cpu_load(node).await.unwrap_or(node.cpu_load);

        match self.fetch_meetings(node, cluster).await {
            Ok((snapshot, census, raw_xml)) => {
                if let Err(e) = self.store.upsert_node_meeting_list(node.uuid, &raw_xml) {
                    tracing::warn!("failed to cache meeting list for {}: {e}", node.slug);
                }
                if let Err(e) = self.store.update_node_load(
                    node.uuid,
                    snapshot.attendees,
                    snapshot.meetings,
                    cpu_load,
                    false,
                ) {
                    tracing::error!("failed to persist node load for {}: {e}", node.slug);
                    return;
                }
                self.reconcile_meetings(node, &census).await;
            }
            Err(e) => {
                tracing::warn!("node {} poll failed, marking errored: {e}", node.slug);
                let _ = self.store.update_node_load(node.uuid, 0, 0, cpu_load, true);
            }
        }
    }

    /// `GET /b3lb/load` on the node itself: a single-line integer CPU load
    /// reading, independent of the backend protocol's checksum scheme.
    async fn fetch_cpu_load(&self, node: &Node) -> Option<i64> {
        let url = format!("https://{}/b3lb/load", node.domain);
        let response = tokio::time::timeout(self.request_timeout, self.client.get(&url).send())
            .await
            .ok()?
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.text().await.ok()?;
        body.lines().next()?.trim().parse().ok()
    }

    async fn fetch_meetings(
        &self,
        node: &Node,
        cluster: &Cluster,
    ) -> Result<(NodeSnapshot, HashMap<String, MeetingCensusEntry>, String), String> {
        let query_string = "";
        let checksum = sign_outbound("getMeetings", query_string, &node.secret, cluster.hash_algorithm);
        let url = format!(
            "https://{}/bigbluebutton/api/getMeetings?checksum={}",
            node.domain, checksum
        );

        let response = tokio::time::timeout(self.request_timeout, self.client.get(&url).send())
            .await
            .map_err(|_| "request timed out".to_string())?
            .map_err(|e| e.to_string())?;

        let body = response.text().await.map_err(|e| e.to_string())?;
        let parsed: MeetingsResponse = quick_xml::de::from_str(&body).map_err(|e| e.to_string())?;

        let mut snapshot = NodeSnapshot::default();
        let mut census = HashMap::with_capacity(parsed.meetings.meeting.len());
        for meeting in &parsed.meetings.meeting {
            if meeting.is_breakout != "true" {
                snapshot.meetings += 1;
                snapshot.attendees += meeting.participant_count;
                snapshot.listeners += meeting.listener_count;
                snapshot.voices += meeting.voice_participant_count;
                snapshot.moderators += meeting.moderator_count;
                snapshot.videos += meeting.video_count;
            }
            census.insert(
                meeting.meeting_id.clone(),
                MeetingCensusEntry {
                    participant_count: meeting.participant_count,
                    listener_count: meeting.listener_count,
                    voice_participant_count: meeting.voice_participant_count,
                    moderator_count: meeting.moderator_count,
                    video_count: meeting.video_count,
                    bbb_origin: meeting.metadata.bbb_origin.clone().unwrap_or_default(),
                    bbb_origin_server_name: meeting.metadata.bbb_origin_server_name.clone().unwrap_or_default(),
                },
            );
        }
        Ok((snapshot, census, body))
    }

    /// Updates live counters on every Meeting row this node still reports,
    /// retires any that have silently disappeared, and refreshes the live
    /// gauges and cached meeting list for every Secret touched. Gauges are
    /// recomputed from a fresh `list_meetings_by_secret` rather than
    /// accumulated from this node's census alone, since a Secret's live
    /// meetings can be spread across several nodes and the gauge has no
    /// node dimension of its own.
    async fn reconcile_meetings(&self, node: &Node, census: &HashMap<String, MeetingCensusEntry>) {
        let stored = match self.store.list_meetings_by_node(node.uuid) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("failed to list stored meetings for node {}: {e}", node.slug);
                return;
            }
        };

        let mut affected_secrets: HashSet<Uuid> = HashSet::new();
        for meeting in &stored {
            affected_secrets.insert(meeting.secret_uuid);
            match census.get(&meeting.id) {
                Some(c) => {
                    if let Err(e) = self.store.update_meeting_census(
                        &meeting.id,
                        meeting.secret_uuid,
                        c.participant_count,
                        c.listener_count,
                        c.voice_participant_count,
                        c.moderator_count,
                        c.video_count,
                        &c.bbb_origin,
                        &c.bbb_origin_server_name,
                    ) {
                        tracing::warn!("failed to reconcile meeting {}: {e}", meeting.id);
                    }
                }
                None => {
                    let age_secs = (Utc::now() - meeting.created_at).num_seconds();
                    if age_secs > MEETING_GONE_GRACE_SECONDS {
                        if age_secs < MEETING_DURATION_CEILING_SECONDS {
                            let _ = counters::record_meeting_ended(&self.store, meeting.secret_uuid, age_secs);
                        }
                        let _ = self.store.delete_meeting(&meeting.id, meeting.secret_uuid);
                    }
                }
            }
        }

        for secret_uuid in affected_secrets {
            self.refresh_secret_gauges(secret_uuid);
        }
    }

    fn refresh_secret_gauges(&self, secret_uuid: Uuid) {
        let meetings = match self.store.list_meetings_by_secret(secret_uuid) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("failed to recompute gauges for secret {secret_uuid}: {e}");
                return;
            }
        };

        let attendees: i64 = meetings.iter().map(|m| m.attendees).sum();
        let listeners: i64 = meetings.iter().map(|m| m.listener_count).sum();
        let voices: i64 = meetings.iter().map(|m| m.voice_participant_count).sum();
        let videos: i64 = meetings.iter().map(|m| m.video_count).sum();
        let count = meetings.len() as i64;

        if let Err(e) = counters::set_live_gauges(&self.store, secret_uuid, attendees, listeners, voices, videos, count) {
            tracing::warn!("failed to set live gauges for secret {secret_uuid}: {e}");
        }
        if let Err(e) = aggregation::rebuild_secret_meeting_list(&self.store, secret_uuid) {
            tracing::warn!("failed to rebuild meeting list for secret {secret_uuid}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_meetings_response_and_sums_participants() {
        let xml = r#"<response>
            <meetings>
                <meeting>
                    <meetingID>m1</meetingID>
                    <participantCount>3</participantCount>
                    <listenerCount>1</listenerCount>
                    <voiceParticipantCount>1</voiceParticipantCount>
                    <moderatorCount>1</moderatorCount>
                    <videoCount>0</videoCount>
                    <isBreakout>false</isBreakout>
                </meeting>
                <meeting>
                    <meetingID>m2</meetingID>
                    <participantCount>2</participantCount>
                    <listenerCount>0</listenerCount>
                    <voiceParticipantCount>0</voiceParticipantCount>
                    <moderatorCount>1</moderatorCount>
                    <videoCount>1</videoCount>
                    <isBreakout>false</isBreakout>
                </meeting>
            </meetings>
        </response>"#;

        let parsed: MeetingsResponse = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.meetings.meeting.len(), 2);
        let total_attendees: i64 = parsed.meetings.meeting.iter().map(|m| m.participant_count).sum();
        assert_eq!(total_attendees, 5);
    }

    #[test]
    fn empty_meetings_response_parses_to_zero() {
        let xml = "<response><meetings></meetings></response>";
        let parsed: MeetingsResponse = quick_xml::de::from_str(xml).unwrap();
        assert!(parsed.meetings.meeting.is_empty());
    }

    #[test]
    fn breakout_meetings_are_excluded_from_node_snapshot_but_kept_in_census() {
        let xml = r#"<response>
            <meetings>
                <meeting>
                    <meetingID>main</meetingID>
                    <participantCount>4</participantCount>
                    <listenerCount>0</listenerCount>
                    <voiceParticipantCount>0</voiceParticipantCount>
                    <moderatorCount>1</moderatorCount>
                    <videoCount>0</videoCount>
                    <isBreakout>false</isBreakout>
                </meeting>
                <meeting>
                    <meetingID>main-breakout1</meetingID>
                    <participantCount>2</participantCount>
                    <listenerCount>0</listenerCount>
                    <voiceParticipantCount>0</voiceParticipantCount>
                    <moderatorCount>0</moderatorCount>
                    <videoCount>0</videoCount>
                    <isBreakout>true</isBreakout>
                </meeting>
            </meetings>
        </response>"#;

        let parsed: MeetingsResponse = quick_xml::de::from_str(xml).unwrap();
        let mut snapshot = NodeSnapshot::default();
        let mut census = HashMap::new();
        for meeting in &parsed.meetings.meeting {
            if meeting.is_breakout != "true" {
                snapshot.meetings += 1;
                snapshot.attendees += meeting.participant_count;
            }
            census.insert(meeting.meeting_id.clone(), ());
        }
        assert_eq!(snapshot.meetings, 1);
        assert_eq!(snapshot.attendees, 4);
        assert_eq!(census.len(), 2);
    }
}
