//! Data model entities. Field names and defaults follow the upstream
//! reference implementation's `models.py`; this module only expresses them
//! as plain Rust structs persisted through `b3lb-storage`'s `Store` trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::signing::ShaAlgorithm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordSetState {
    Unknown,
    Uploaded,
    Rendered,
    Deleting,
}

impl RecordSetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSetState::Unknown => "UNKNOWN",
            RecordSetState::Uploaded => "UPLOADED",
            RecordSetState::Rendered => "RENDERED",
            RecordSetState::Deleting => "DELETING",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "UNKNOWN" => Some(RecordSetState::Unknown),
            "UPLOADED" => Some(RecordSetState::Uploaded),
            "RENDERED" => Some(RecordSetState::Rendered),
            "DELETING" => Some(RecordSetState::Deleting),
            _ => None,
        }
    }

    /// Whether `self -> next` is a legal lifecycle transition (monotonic,
    /// no backward moves — invariant (iii) of the data model).
    pub fn can_transition_to(&self, next: RecordSetState) -> bool {
        use RecordSetState::*;
        matches!(
            (self, next),
            (Unknown, Uploaded)
                | (Unknown, Deleting)
                | (Uploaded, Rendered)
                | (Uploaded, Deleting)
                | (Rendered, Deleting)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub uuid: Uuid,
    pub name: String,
    pub load_a_factor: f64,
    pub load_m_factor: f64,
    pub load_cpu_iterations: i64,
    pub load_cpu_max: f64,
    pub hash_algorithm: ShaAlgorithm,
}

impl Default for Cluster {
    fn default() -> Self {
        Self {
            uuid: Uuid::nil(),
            name: String::new(),
            load_a_factor: 1.0,
            load_m_factor: 30.0,
            load_cpu_iterations: 6,
            load_cpu_max: 5000.0,
            hash_algorithm: ShaAlgorithm::Sha256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub uuid: Uuid,
    pub cluster_uuid: Uuid,
    pub slug: String,
    pub domain: String,
    pub secret: String,
    pub attendees: i64,
    pub meetings: i64,
    pub cpu_load: i64,
    pub has_errors: bool,
    pub maintenance: bool,
}

impl Node {
    /// Node.load property: -2 maintenance, -1 errored, else weighted sum of
    /// attendee/meeting counts plus a CPU-load polynomial term.
    pub fn load(&self, cluster: &Cluster) -> i64 {
        if self.maintenance {
            return -2;
        }
        if self.has_errors {
            return -1;
        }

        let work_attendees = self.attendees as f64 * cluster.load_a_factor;
        let work_meetings = self.meetings as f64 * cluster.load_m_factor;

        let mut work_cpu = 0.0f64;
        for iteration in 1..=cluster.load_cpu_iterations {
            work_cpu += (self.cpu_load as f64 / 10000.0).powi(iteration as i32);
        }
        work_cpu *= cluster.load_cpu_max / cluster.load_cpu_iterations as f64;

        (work_attendees + work_meetings + work_cpu) as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterGroup {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterGroupRelation {
    pub uuid: Uuid,
    pub cluster_group_uuid: Uuid,
    pub cluster_uuid: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub uuid: Uuid,
    pub slug: String,
    pub description: String,
    pub cluster_group_uuid: Uuid,
    pub attendee_limit: i64,
    pub meeting_limit: i64,
    pub recording_enabled: bool,
    pub records_hold_time: i64,
    pub stats_token: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub uuid: Uuid,
    pub tenant_uuid: Uuid,
    pub description: String,
    pub sub_id: i32,
    pub secret: String,
    pub secret2: String,
    pub attendee_limit: i64,
    pub meeting_limit: i64,
    pub recording_enabled: bool,
    pub records_hold_time: i64,
}

impl Secret {
    pub fn is_record_enabled(&self, tenant: &Tenant) -> bool {
        self.recording_enabled && tenant.recording_enabled
    }

    /// Effective retention window: the minimum of the two hold times,
    /// unless either is 0 (unlimited), in which case the maximum wins.
    pub fn records_effective_hold_time(&self, tenant: &Tenant) -> i64 {
        if self.records_hold_time == 0 || tenant.records_hold_time == 0 {
            self.records_hold_time.max(tenant.records_hold_time)
        } else {
            self.records_hold_time.min(tenant.records_hold_time)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub secret_uuid: Uuid,
    pub node_uuid: Uuid,
    pub room_name: String,
    pub created_at: DateTime<Utc>,
    pub attendees: i64,
    pub listener_count: i64,
    pub voice_participant_count: i64,
    pub moderator_count: i64,
    pub video_count: i64,
    pub bbb_origin: String,
    pub bbb_origin_server_name: String,
    pub end_callback_url: String,
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMeetingList {
    pub node_uuid: Uuid,
    pub xml: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretMeetingList {
    pub secret_uuid: Uuid,
    pub xml: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSet {
    pub uuid: Uuid,
    pub secret_uuid: Uuid,
    pub meeting_id: String,
    pub state: RecordSetState,
    pub nonce: String,
    pub recording_ready_origin_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub bbb_origin: Option<String>,
    pub bbb_origin_version: Option<String>,
    pub bbb_origin_server_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub participants: i64,
    pub gl_listed: bool,
}

impl RecordSet {
    /// 4-level base32 blob path derived from the record set's UUID, per the
    /// configured path hierarchy width/depth.
    pub fn blob_path(&self, width: usize, depth: usize) -> String {
        crate::blob_path::hierarchy_path(&self.uuid, width, depth)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordProfile {
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub width: i64,
    pub height: i64,
    pub webcam_width: i64,
    pub webcam_height: i64,
    pub webcam_side_by_side: bool,
    pub include_annotations: bool,
    pub container: String,
    pub extension: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecordProfileRelation {
    pub uuid: Uuid,
    pub secret_uuid: Uuid,
    pub record_profile_uuid: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub uuid: Uuid,
    pub record_set_uuid: Uuid,
    pub record_profile_uuid: Uuid,
    pub file_path: String,
    pub published: bool,
    pub delivery_nonce: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricName {
    Attendees,
    Listeners,
    Voices,
    Videos,
    Meetings,
    AttendeesTotal,
    MeetingsTotal,
    MeetingDurationSecondsCount,
    MeetingDurationSecondsSum,
    AttendeeLimitHits,
    MeetingLimitHits,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Attendees => "attendees",
            MetricName::Listeners => "listeners",
            MetricName::Voices => "voices",
            MetricName::Videos => "videos",
            MetricName::Meetings => "meetings",
            MetricName::AttendeesTotal => "attendees_total",
            MetricName::MeetingsTotal => "meetings_total",
            MetricName::MeetingDurationSecondsCount => "meeting_duration_seconds_count",
            MetricName::MeetingDurationSecondsSum => "meeting_duration_seconds_sum",
            MetricName::AttendeeLimitHits => "attendee_limit_hits",
            MetricName::MeetingLimitHits => "meeting_limit_hits",
        }
    }

    /// Gauges are overwritten absolutely on every poll cycle; everything
    /// else is a monotonic (mod 2^63) counter.
    pub fn is_gauge(&self) -> bool {
        matches!(
            self,
            MetricName::Attendees
                | MetricName::Listeners
                | MetricName::Voices
                | MetricName::Videos
                | MetricName::Meetings
        )
    }

    pub const GAUGES: [MetricName; 5] = [
        MetricName::Attendees,
        MetricName::Listeners,
        MetricName::Voices,
        MetricName::Videos,
        MetricName::Meetings,
    ];

    pub const ALL: [MetricName; 11] = [
        MetricName::Attendees,
        MetricName::Listeners,
        MetricName::Voices,
        MetricName::Videos,
        MetricName::Meetings,
        MetricName::AttendeesTotal,
        MetricName::MeetingsTotal,
        MetricName::MeetingDurationSecondsCount,
        MetricName::MeetingDurationSecondsSum,
        MetricName::AttendeeLimitHits,
        MetricName::MeetingLimitHits,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: MetricName,
    pub secret_uuid: Option<Uuid>,
    pub node_uuid: Option<Uuid>,
    pub value: i64,
}

/// 2^63, the wraparound modulus for counter-kind metrics.
pub const METRIC_MODULO: i128 = 9_223_372_036_854_775_808;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub uuid: Uuid,
    pub tenant_uuid: Option<Uuid>,
    pub bbb_origin: String,
    pub bbb_origin_server_name: String,
    pub attendees: i64,
    pub meetings: i64,
    pub listener_count: i64,
    pub voice_participant_count: i64,
    pub moderator_count: i64,
    pub video_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterMode {
    Block,
    Set,
    Override,
}

impl ParameterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterMode::Block => "BLOCK",
            ParameterMode::Set => "SET",
            ParameterMode::Override => "OVERRIDE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BLOCK" => Some(ParameterMode::Block),
            "SET" => Some(ParameterMode::Set),
            "OVERRIDE" => Some(ParameterMode::Override),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub tenant_uuid: Uuid,
    pub parameter: String,
    pub mode: ParameterMode,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Asset {
    pub tenant_uuid: Uuid,
    pub slide_blob_key: Option<String>,
    pub slide_filename: Option<String>,
    pub slide_mimetype: Option<String>,
    pub logo_blob_key: Option<String>,
    pub logo_mimetype: Option<String>,
    pub custom_css_blob_key: Option<String>,
}
