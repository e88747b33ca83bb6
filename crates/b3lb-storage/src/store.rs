//! SQLite-backed persistence for the full data model. One connection is
//! opened per call, matching the local filesystem backend's approach: the
//! underlying SQLite file tolerates many short-lived connections far better
//! than this service would tolerate a connection pool it has to tune.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use b3lb_core::error::{B3lbError, Result};
use b3lb_core::model::{
    Asset, Cluster, Meeting, MetricName, Node, Parameter, ParameterMode, Record, RecordProfile,
    RecordSet, RecordSetState, Secret, Stats, Tenant,
};
use b3lb_core::schema::init_sqlite_schema;
use b3lb_core::signing::ShaAlgorithm;

#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        let conn = store.get_connection()?;
        drop(conn);
        Ok(store)
    }

    pub fn get_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        init_sqlite_schema(&conn)?;
        Ok(conn)
    }

    /// Liveness probe: opens a connection and runs a trivial query. Errors
    /// propagate rather than being swallowed, so callers can distinguish a
    /// healthy store from one that can't be reached.
    pub fn ping(&self) -> Result<()> {
        self.get_connection()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    // -- clusters ---------------------------------------------------------

    pub fn insert_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO clusters (uuid, name, load_a_factor, load_m_factor, load_cpu_iterations, load_cpu_max, hash_algorithm)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                cluster.uuid.to_string(),
                cluster.name,
                cluster.load_a_factor,
                cluster.load_m_factor,
                cluster.load_cpu_iterations,
                cluster.load_cpu_max,
                cluster.hash_algorithm.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_cluster(&self, uuid: Uuid) -> Result<Cluster> {
        self.get_connection()?
            .query_row(
                "SELECT uuid, name, load_a_factor, load_m_factor, load_cpu_iterations, load_cpu_max, hash_algorithm
                 FROM clusters WHERE uuid = ?1",
                params![uuid.to_string()],
                row_to_cluster,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("cluster {uuid}")))
    }

    pub fn list_clusters(&self) -> Result<Vec<Cluster>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, name, load_a_factor, load_m_factor, load_cpu_iterations, load_cpu_max, hash_algorithm FROM clusters",
        )?;
        let rows = stmt
            .query_map([], row_to_cluster)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -- nodes --------------------------------------------------------------

    pub fn insert_node(&self, node: &Node) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO nodes (uuid, cluster_uuid, slug, domain, secret, attendees, meetings, cpu_load, has_errors, maintenance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                node.uuid.to_string(),
                node.cluster_uuid.to_string(),
                node.slug,
                node.domain,
                node.secret,
                node.attendees,
                node.meetings,
                node.cpu_load,
                node.has_errors,
                node.maintenance,
            ],
        )?;
        Ok(())
    }

    pub fn get_node(&self, uuid: Uuid) -> Result<Node> {
        self.get_connection()?
            .query_row(
                "SELECT uuid, cluster_uuid, slug, domain, secret, attendees, meetings, cpu_load, has_errors, maintenance
                 FROM nodes WHERE uuid = ?1",
                params![uuid.to_string()],
                row_to_node,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("node {uuid}")))
    }

    pub fn list_nodes_by_cluster(&self, cluster_uuid: Uuid) -> Result<Vec<Node>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, cluster_uuid, slug, domain, secret, attendees, meetings, cpu_load, has_errors, maintenance
             FROM nodes WHERE cluster_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![cluster_uuid.to_string()], row_to_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Applied after each node poll cycle: overwrites the gauge-like load
    /// inputs with the freshly observed values.
    pub fn update_node_load(
        &self,
        uuid: Uuid,
        attendees: i64,
        meetings: i64,
        cpu_load: i64,
        has_errors: bool,
    ) -> Result<()> {
        self.get_connection()?.execute(
            "UPDATE nodes SET attendees = ?2, meetings = ?3, cpu_load = ?4, has_errors = ?5 WHERE uuid = ?1",
            params![uuid.to_string(), attendees, meetings, cpu_load, has_errors],
        )?;
        Ok(())
    }

    pub fn list_all_nodes(&self) -> Result<Vec<Node>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, cluster_uuid, slug, domain, secret, attendees, meetings, cpu_load, has_errors, maintenance
             FROM nodes",
        )?;
        let rows = stmt
            .query_map([], row_to_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every Node attached to any Cluster in a ClusterGroup, paired with its
    /// owning Cluster — the candidate set the node selector picks from.
    pub fn list_nodes_for_cluster_group(&self, cluster_group_uuid: Uuid) -> Result<Vec<(Node, Cluster)>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT n.uuid, n.cluster_uuid, n.slug, n.domain, n.secret, n.attendees, n.meetings, n.cpu_load, n.has_errors, n.maintenance,
                    c.uuid, c.name, c.load_a_factor, c.load_m_factor, c.load_cpu_iterations, c.load_cpu_max, c.hash_algorithm
             FROM nodes n
             JOIN cluster_group_relations r ON r.cluster_uuid = n.cluster_uuid
             JOIN clusters c ON c.uuid = n.cluster_uuid
             WHERE r.cluster_group_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![cluster_group_uuid.to_string()], |row| {
                let node = row_to_node(row)?;
                let algo: String = row.get(16)?;
                let cluster = Cluster {
                    uuid: parse_uuid(row.get(10)?)?,
                    name: row.get(11)?,
                    load_a_factor: row.get(12)?,
                    load_m_factor: row.get(13)?,
                    load_cpu_iterations: row.get(14)?,
                    load_cpu_max: row.get(15)?,
                    hash_algorithm: ShaAlgorithm::from_name(&algo).unwrap_or(ShaAlgorithm::Sha256),
                };
                Ok((node, cluster))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_node_maintenance(&self, uuid: Uuid, maintenance: bool) -> Result<()> {
        self.get_connection()?.execute(
            "UPDATE nodes SET maintenance = ?2 WHERE uuid = ?1",
            params![uuid.to_string(), maintenance],
        )?;
        Ok(())
    }

    // -- cached meeting list XML --------------------------------------------------------------

    pub fn upsert_node_meeting_list(&self, node_uuid: Uuid, xml: &str) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO node_meeting_lists (node_uuid, xml, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(node_uuid) DO UPDATE SET xml = excluded.xml, updated_at = excluded.updated_at",
            params![node_uuid.to_string(), xml, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_node_meeting_list(&self, node_uuid: Uuid) -> Result<Option<String>> {
        Ok(self
            .get_connection()?
            .query_row(
                "SELECT xml FROM node_meeting_lists WHERE node_uuid = ?1",
                params![node_uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn upsert_secret_meeting_list(&self, secret_uuid: Uuid, xml: &str) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO secret_meeting_lists (secret_uuid, xml, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(secret_uuid) DO UPDATE SET xml = excluded.xml, updated_at = excluded.updated_at",
            params![secret_uuid.to_string(), xml, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_secret_meeting_list(&self, secret_uuid: Uuid) -> Result<Option<String>> {
        Ok(self
            .get_connection()?
            .query_row(
                "SELECT xml FROM secret_meeting_lists WHERE secret_uuid = ?1",
                params![secret_uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    // -- tenants --------------------------------------------------------------

    pub fn insert_tenant(&self, tenant: &Tenant) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO tenants (uuid, slug, description, cluster_group_uuid, attendee_limit, meeting_limit, recording_enabled, records_hold_time, stats_token)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                tenant.uuid.to_string(),
                tenant.slug,
                tenant.description,
                tenant.cluster_group_uuid.to_string(),
                tenant.attendee_limit,
                tenant.meeting_limit,
                tenant.recording_enabled,
                tenant.records_hold_time,
                tenant.stats_token.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn get_tenant_by_slug(&self, slug: &str) -> Result<Tenant> {
        self.get_connection()?
            .query_row(
                "SELECT uuid, slug, description, cluster_group_uuid, attendee_limit, meeting_limit, recording_enabled, records_hold_time, stats_token
                 FROM tenants WHERE slug = ?1",
                params![slug],
                row_to_tenant,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("tenant {slug}")))
    }

    pub fn get_tenant(&self, uuid: Uuid) -> Result<Tenant> {
        self.get_connection()?
            .query_row(
                "SELECT uuid, slug, description, cluster_group_uuid, attendee_limit, meeting_limit, recording_enabled, records_hold_time, stats_token
                 FROM tenants WHERE uuid = ?1",
                params![uuid.to_string()],
                row_to_tenant,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("tenant {uuid}")))
    }

    pub fn list_all_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, slug, description, cluster_group_uuid, attendee_limit, meeting_limit, recording_enabled, records_hold_time, stats_token
             FROM tenants",
        )?;
        let rows = stmt
            .query_map([], row_to_tenant)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -- secrets --------------------------------------------------------------

    pub fn insert_secret(&self, secret: &Secret) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO secrets (uuid, tenant_uuid, description, sub_id, secret, secret2, attendee_limit, meeting_limit, recording_enabled, records_hold_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                secret.uuid.to_string(),
                secret.tenant_uuid.to_string(),
                secret.description,
                secret.sub_id,
                secret.secret,
                secret.secret2,
                secret.attendee_limit,
                secret.meeting_limit,
                secret.recording_enabled,
                secret.records_hold_time,
            ],
        )?;
        Ok(())
    }

    pub fn get_secret(&self, uuid: Uuid) -> Result<Secret> {
        self.get_connection()?
            .query_row(
                "SELECT uuid, tenant_uuid, description, sub_id, secret, secret2, attendee_limit, meeting_limit, recording_enabled, records_hold_time
                 FROM secrets WHERE uuid = ?1",
                params![uuid.to_string()],
                row_to_secret,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("secret {uuid}")))
    }

    pub fn list_secrets_for_tenant(&self, tenant_uuid: Uuid) -> Result<Vec<Secret>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, tenant_uuid, description, sub_id, secret, secret2, attendee_limit, meeting_limit, recording_enabled, records_hold_time
             FROM secrets WHERE tenant_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![tenant_uuid.to_string()], row_to_secret)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_all_secrets(&self) -> Result<Vec<Secret>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, tenant_uuid, description, sub_id, secret, secret2, attendee_limit, meeting_limit, recording_enabled, records_hold_time
             FROM secrets",
        )?;
        let rows = stmt
            .query_map([], row_to_secret)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_secret_by_tenant_and_subid(&self, tenant_uuid: Uuid, sub_id: i32) -> Result<Secret> {
        self.get_connection()?
            .query_row(
                "SELECT uuid, tenant_uuid, description, sub_id, secret, secret2, attendee_limit, meeting_limit, recording_enabled, records_hold_time
                 FROM secrets WHERE tenant_uuid = ?1 AND sub_id = ?2",
                params![tenant_uuid.to_string(), sub_id],
                row_to_secret,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("secret {tenant_uuid}/{sub_id}")))
    }

    // -- meetings --------------------------------------------------------------

    pub fn upsert_meeting(&self, meeting: &Meeting) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO meetings (id, secret_uuid, node_uuid, room_name, created_at, attendees, listener_count, voice_participant_count, moderator_count, video_count, bbb_origin, bbb_origin_server_name, end_callback_url, nonce)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id, secret_uuid) DO UPDATE SET
                node_uuid = excluded.node_uuid,
                attendees = excluded.attendees,
                listener_count = excluded.listener_count,
                voice_participant_count = excluded.voice_participant_count,
                moderator_count = excluded.moderator_count,
                video_count = excluded.video_count",
            params![
                meeting.id,
                meeting.secret_uuid.to_string(),
                meeting.node_uuid.to_string(),
                meeting.room_name,
                meeting.created_at.to_rfc3339(),
                meeting.attendees,
                meeting.listener_count,
                meeting.voice_participant_count,
                meeting.moderator_count,
                meeting.video_count,
                meeting.bbb_origin,
                meeting.bbb_origin_server_name,
                meeting.end_callback_url,
                meeting.nonce,
            ],
        )?;
        Ok(())
    }

    pub fn get_meeting(&self, id: &str, secret_uuid: Uuid) -> Result<Meeting> {
        self.get_connection()?
            .query_row(
                "SELECT id, secret_uuid, node_uuid, room_name, created_at, attendees, listener_count, voice_participant_count, moderator_count, video_count, bbb_origin, bbb_origin_server_name, end_callback_url, nonce
                 FROM meetings WHERE id = ?1 AND secret_uuid = ?2",
                params![id, secret_uuid.to_string()],
                row_to_meeting,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("meeting {id}")))
    }

    /// Looks up a meeting by id alone, for the end-callback handler, which
    /// only ever receives a `meetingID` and a nonce — the nonce comparison
    /// that follows is what actually authenticates the request.
    pub fn get_meeting_any_secret(&self, id: &str) -> Result<Meeting> {
        self.get_connection()?
            .query_row(
                "SELECT id, secret_uuid, node_uuid, room_name, created_at, attendees, listener_count, voice_participant_count, moderator_count, video_count, bbb_origin, bbb_origin_server_name, end_callback_url, nonce
                 FROM meetings WHERE id = ?1",
                params![id],
                row_to_meeting,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("meeting {id}")))
    }

    pub fn delete_meeting(&self, id: &str, secret_uuid: Uuid) -> Result<()> {
        self.get_connection()?.execute(
            "DELETE FROM meetings WHERE id = ?1 AND secret_uuid = ?2",
            params![id, secret_uuid.to_string()],
        )?;
        Ok(())
    }

    /// Reconciles a polled meeting's live counters and origin metadata in
    /// one shot; unlike [`Store::upsert_meeting`], this also updates
    /// `bbb_origin`/`bbb_origin_server_name` on conflict, since those only
    /// become known once a Node's `getMeetings` census reports them.
    pub fn update_meeting_census(
        &self,
        id: &str,
        secret_uuid: Uuid,
        attendees: i64,
        listener_count: i64,
        voice_participant_count: i64,
        moderator_count: i64,
        video_count: i64,
        bbb_origin: &str,
        bbb_origin_server_name: &str,
    ) -> Result<()> {
        self.get_connection()?.execute(
            "UPDATE meetings SET attendees = ?3, listener_count = ?4, voice_participant_count = ?5,
                moderator_count = ?6, video_count = ?7, bbb_origin = ?8, bbb_origin_server_name = ?9
             WHERE id = ?1 AND secret_uuid = ?2",
            params![
                id,
                secret_uuid.to_string(),
                attendees,
                listener_count,
                voice_participant_count,
                moderator_count,
                video_count,
                bbb_origin,
                bbb_origin_server_name,
            ],
        )?;
        Ok(())
    }

    pub fn list_meetings_by_node(&self, node_uuid: Uuid) -> Result<Vec<Meeting>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, secret_uuid, node_uuid, room_name, created_at, attendees, listener_count, voice_participant_count, moderator_count, video_count, bbb_origin, bbb_origin_server_name, end_callback_url, nonce
             FROM meetings WHERE node_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![node_uuid.to_string()], row_to_meeting)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_meetings_by_secret(&self, secret_uuid: Uuid) -> Result<Vec<Meeting>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, secret_uuid, node_uuid, room_name, created_at, attendees, listener_count, voice_participant_count, moderator_count, video_count, bbb_origin, bbb_origin_server_name, end_callback_url, nonce
             FROM meetings WHERE secret_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![secret_uuid.to_string()], row_to_meeting)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every live meeting under any Secret belonging to a Tenant, paired
    /// with whether its Node is currently errored — feeds the tenant stats
    /// sweep, which excludes errored-node meetings from its accumulation.
    pub fn list_meetings_with_node_status_by_tenant(
        &self,
        tenant_uuid: Uuid,
    ) -> Result<Vec<(Meeting, bool)>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.secret_uuid, m.node_uuid, m.room_name, m.created_at, m.attendees, m.listener_count, m.voice_participant_count, m.moderator_count, m.video_count, m.bbb_origin, m.bbb_origin_server_name, m.end_callback_url, m.nonce, n.has_errors
             FROM meetings m
             JOIN secrets s ON s.uuid = m.secret_uuid
             JOIN nodes n ON n.uuid = m.node_uuid
             WHERE s.tenant_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![tenant_uuid.to_string()], |row| {
                let meeting = row_to_meeting(row)?;
                let has_errors: bool = row.get(14)?;
                Ok((meeting, has_errors))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Running totals used by the node-selector's limit gate before a new
    /// meeting is admitted.
    pub fn count_meetings_and_attendees_for_secret(&self, secret_uuid: Uuid) -> Result<(i64, i64)> {
        self.get_connection()?.query_row(
            "SELECT COUNT(*), COALESCE(SUM(attendees), 0) FROM meetings WHERE secret_uuid = ?1",
            params![secret_uuid.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ).map_err(Into::into)
    }

    // -- record sets --------------------------------------------------------------

    pub fn upsert_record_set(&self, rs: &RecordSet) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO record_sets (uuid, secret_uuid, meeting_id, state, nonce, recording_ready_origin_url, created_at, bbb_origin, bbb_origin_version, bbb_origin_server_name, started_at, ended_at, participants, gl_listed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(uuid) DO UPDATE SET
                state = excluded.state,
                recording_ready_origin_url = excluded.recording_ready_origin_url,
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                participants = excluded.participants,
                gl_listed = excluded.gl_listed",
            params![
                rs.uuid.to_string(),
                rs.secret_uuid.to_string(),
                rs.meeting_id,
                rs.state.as_str(),
                rs.nonce,
                rs.recording_ready_origin_url,
                rs.created_at.to_rfc3339(),
                rs.bbb_origin,
                rs.bbb_origin_version,
                rs.bbb_origin_server_name,
                rs.started_at.map(|t| t.to_rfc3339()),
                rs.ended_at.map(|t| t.to_rfc3339()),
                rs.participants,
                rs.gl_listed,
            ],
        )?;
        Ok(())
    }

    pub fn get_record_set(&self, uuid: Uuid) -> Result<RecordSet> {
        self.get_connection()?
            .query_row(
                "SELECT uuid, secret_uuid, meeting_id, state, nonce, recording_ready_origin_url, created_at, bbb_origin, bbb_origin_version, bbb_origin_server_name, started_at, ended_at, participants, gl_listed
                 FROM record_sets WHERE uuid = ?1",
                params![uuid.to_string()],
                row_to_record_set,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("record set {uuid}")))
    }

    pub fn list_record_sets_by_secret(&self, secret_uuid: Uuid) -> Result<Vec<RecordSet>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, secret_uuid, meeting_id, state, nonce, recording_ready_origin_url, created_at, bbb_origin, bbb_origin_version, bbb_origin_server_name, started_at, ended_at, participants, gl_listed
             FROM record_sets WHERE secret_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![secret_uuid.to_string()], row_to_record_set)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Record sets whose retention window has elapsed, for the sweep task.
    pub fn list_record_sets_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecordSet>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, secret_uuid, meeting_id, state, nonce, recording_ready_origin_url, created_at, bbb_origin, bbb_origin_version, bbb_origin_server_name, started_at, ended_at, participants, gl_listed
             FROM record_sets WHERE created_at < ?1 AND state != 'DELETING'",
        )?;
        let rows = stmt
            .query_map(params![cutoff.to_rfc3339()], row_to_record_set)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Enforces the lifecycle state machine before persisting a transition.
    pub fn transition_record_set_state(&self, uuid: Uuid, next: RecordSetState) -> Result<()> {
        let current = self.get_record_set(uuid)?;
        if !current.state.can_transition_to(next) {
            return Err(B3lbError::ValidationError(format!(
                "illegal record set transition {:?} -> {:?}",
                current.state, next
            )));
        }
        self.get_connection()?.execute(
            "UPDATE record_sets SET state = ?2 WHERE uuid = ?1",
            params![uuid.to_string(), next.as_str()],
        )?;
        Ok(())
    }

    pub fn get_record_set_by_nonce(&self, nonce: &str) -> Result<RecordSet> {
        self.get_connection()?
            .query_row(
                "SELECT uuid, secret_uuid, meeting_id, state, nonce, recording_ready_origin_url, created_at, bbb_origin, bbb_origin_version, bbb_origin_server_name, started_at, ended_at, participants, gl_listed
                 FROM record_sets WHERE nonce = ?1",
                params![nonce],
                row_to_record_set,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("record set with nonce {nonce}")))
    }

    /// Removes the record set row itself; callers are responsible for
    /// deleting its `Record` rows and blobs first.
    pub fn delete_record_set(&self, uuid: Uuid) -> Result<()> {
        self.get_connection()?
            .execute("DELETE FROM record_sets WHERE uuid = ?1", params![uuid.to_string()])?;
        Ok(())
    }

    // -- records --------------------------------------------------------------

    pub fn insert_record(&self, record: &Record) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO records (uuid, record_set_uuid, record_profile_uuid, file_path, published, delivery_nonce, display_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.uuid.to_string(),
                record.record_set_uuid.to_string(),
                record.record_profile_uuid.to_string(),
                record.file_path,
                record.published,
                record.delivery_nonce,
                record.display_name,
            ],
        )?;
        Ok(())
    }

    pub fn list_records_by_record_set(&self, record_set_uuid: Uuid) -> Result<Vec<Record>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, record_set_uuid, record_profile_uuid, file_path, published, delivery_nonce, display_name
             FROM records WHERE record_set_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![record_set_uuid.to_string()], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_record_published(&self, uuid: Uuid, published: bool) -> Result<()> {
        self.get_connection()?.execute(
            "UPDATE records SET published = ?2 WHERE uuid = ?1",
            params![uuid.to_string(), published],
        )?;
        Ok(())
    }

    pub fn update_record_display_name(&self, uuid: Uuid, display_name: &str) -> Result<()> {
        self.get_connection()?.execute(
            "UPDATE records SET display_name = ?2 WHERE uuid = ?1",
            params![uuid.to_string(), display_name],
        )?;
        Ok(())
    }

    pub fn get_record_by_delivery_nonce(&self, nonce: &str) -> Result<Record> {
        self.get_connection()?
            .query_row(
                "SELECT uuid, record_set_uuid, record_profile_uuid, file_path, published, delivery_nonce, display_name
                 FROM records WHERE delivery_nonce = ?1",
                params![nonce],
                row_to_record,
            )
            .optional()?
            .ok_or_else(|| B3lbError::NotFound(format!("record with delivery nonce {nonce}")))
    }

    pub fn delete_record(&self, uuid: Uuid) -> Result<()> {
        self.get_connection()?
            .execute("DELETE FROM records WHERE uuid = ?1", params![uuid.to_string()])?;
        Ok(())
    }

    // -- record profiles --------------------------------------------------------------

    pub fn upsert_record_profile(&self, profile: &RecordProfile) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO record_profiles (uuid, name, description, width, height, webcam_width, webcam_height, webcam_side_by_side, include_annotations, container, extension, is_default)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(uuid) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                width = excluded.width,
                height = excluded.height,
                webcam_width = excluded.webcam_width,
                webcam_height = excluded.webcam_height,
                webcam_side_by_side = excluded.webcam_side_by_side,
                include_annotations = excluded.include_annotations,
                container = excluded.container,
                extension = excluded.extension,
                is_default = excluded.is_default",
            params![
                profile.uuid.to_string(),
                profile.name,
                profile.description,
                profile.width,
                profile.height,
                profile.webcam_width,
                profile.webcam_height,
                profile.webcam_side_by_side,
                profile.include_annotations,
                profile.container,
                profile.extension,
                profile.is_default,
            ],
        )?;
        Ok(())
    }

    pub fn list_record_profiles(&self) -> Result<Vec<RecordProfile>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, name, description, width, height, webcam_width, webcam_height, webcam_side_by_side, include_annotations, container, extension, is_default
             FROM record_profiles",
        )?;
        let rows = stmt
            .query_map([], row_to_record_profile)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_default_record_profiles(&self) -> Result<Vec<RecordProfile>> {
        Ok(self
            .list_record_profiles()?
            .into_iter()
            .filter(|p| p.is_default)
            .collect())
    }

    /// Profiles a Secret opted into via `secret_record_profile_relations`,
    /// or every default profile if it opted into none.
    pub fn list_record_profiles_for_secret(&self, secret_uuid: Uuid) -> Result<Vec<RecordProfile>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT p.uuid, p.name, p.description, p.width, p.height, p.webcam_width, p.webcam_height, p.webcam_side_by_side, p.include_annotations, p.container, p.extension, p.is_default
             FROM record_profiles p
             JOIN secret_record_profile_relations r ON r.record_profile_uuid = p.uuid
             WHERE r.secret_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![secret_uuid.to_string()], row_to_record_profile)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        if rows.is_empty() {
            self.list_default_record_profiles()
        } else {
            Ok(rows)
        }
    }

    pub fn add_secret_record_profile_relation(&self, secret_uuid: Uuid, record_profile_uuid: Uuid) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT OR IGNORE INTO secret_record_profile_relations (uuid, secret_uuid, record_profile_uuid)
             VALUES (?1, ?2, ?3)",
            params![Uuid::new_v4().to_string(), secret_uuid.to_string(), record_profile_uuid.to_string()],
        )?;
        Ok(())
    }

    // -- metrics --------------------------------------------------------------

    /// Gauges are overwritten; everything else accumulates modulo 2^63,
    /// matching the wraparound counter semantics of the data model.
    pub fn upsert_metric(
        &self,
        name: MetricName,
        secret_uuid: Option<Uuid>,
        node_uuid: Option<Uuid>,
        delta_or_value: i64,
    ) -> Result<()> {
        let conn = self.get_connection()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT value FROM metrics WHERE name = ?1 AND secret_uuid IS ?2 AND node_uuid IS ?3",
                params![
                    name.as_str(),
                    secret_uuid.map(|u| u.to_string()),
                    node_uuid.map(|u| u.to_string())
                ],
                |row| row.get(0),
            )
            .optional()?;

        let next = if name.is_gauge() {
            delta_or_value
        } else {
            match existing {
                Some(prev) => {
                    (((prev as i128) + (delta_or_value as i128)) % b3lb_core::model::METRIC_MODULO)
                        as i64
                }
                None => delta_or_value,
            }
        };

        conn.execute(
            "INSERT INTO metrics (name, secret_uuid, node_uuid, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name, secret_uuid, node_uuid) DO UPDATE SET value = excluded.value",
            params![
                name.as_str(),
                secret_uuid.map(|u| u.to_string()),
                node_uuid.map(|u| u.to_string()),
                next
            ],
        )?;
        Ok(())
    }

    pub fn get_metric(
        &self,
        name: MetricName,
        secret_uuid: Option<Uuid>,
        node_uuid: Option<Uuid>,
    ) -> Result<i64> {
        Ok(self
            .get_connection()?
            .query_row(
                "SELECT value FROM metrics WHERE name = ?1 AND secret_uuid IS ?2 AND node_uuid IS ?3",
                params![
                    name.as_str(),
                    secret_uuid.map(|u| u.to_string()),
                    node_uuid.map(|u| u.to_string())
                ],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0))
    }

    // -- stats --------------------------------------------------------------

    pub fn upsert_stats(&self, stats: &Stats) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO stats (uuid, tenant_uuid, bbb_origin, bbb_origin_server_name, attendees, meetings, listener_count, voice_participant_count, moderator_count, video_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(tenant_uuid, bbb_origin, bbb_origin_server_name) DO UPDATE SET
                attendees = excluded.attendees,
                meetings = excluded.meetings,
                listener_count = excluded.listener_count,
                voice_participant_count = excluded.voice_participant_count,
                moderator_count = excluded.moderator_count,
                video_count = excluded.video_count",
            params![
                stats.uuid.to_string(),
                stats.tenant_uuid.map(|u| u.to_string()),
                stats.bbb_origin,
                stats.bbb_origin_server_name,
                stats.attendees,
                stats.meetings,
                stats.listener_count,
                stats.voice_participant_count,
                stats.moderator_count,
                stats.video_count,
            ],
        )?;
        Ok(())
    }

    pub fn get_stats_by_tenant(&self, tenant_uuid: Uuid) -> Result<Vec<Stats>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, tenant_uuid, bbb_origin, bbb_origin_server_name, attendees, meetings, listener_count, voice_participant_count, moderator_count, video_count
             FROM stats WHERE tenant_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![tenant_uuid.to_string()], row_to_stats)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -- parameters --------------------------------------------------------------

    pub fn list_parameters_for_tenant(&self, tenant_uuid: Uuid) -> Result<Vec<Parameter>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT tenant_uuid, parameter, mode, value FROM parameters WHERE tenant_uuid = ?1",
        )?;
        let rows = stmt
            .query_map(params![tenant_uuid.to_string()], row_to_parameter)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -- assets --------------------------------------------------------------

    pub fn get_asset(&self, tenant_uuid: Uuid) -> Result<Asset> {
        Ok(self
            .get_connection()?
            .query_row(
                "SELECT tenant_uuid, slide_blob_key, slide_filename, slide_mimetype, logo_blob_key, logo_mimetype, custom_css_blob_key
                 FROM assets WHERE tenant_uuid = ?1",
                params![tenant_uuid.to_string()],
                row_to_asset,
            )
            .optional()?
            .unwrap_or(Asset {
                tenant_uuid,
                ..Default::default()
            }))
    }

    pub fn upsert_asset(&self, asset: &Asset) -> Result<()> {
        self.get_connection()?.execute(
            "INSERT INTO assets (tenant_uuid, slide_blob_key, slide_filename, slide_mimetype, logo_blob_key, logo_mimetype, custom_css_blob_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(tenant_uuid) DO UPDATE SET
                slide_blob_key = excluded.slide_blob_key,
                slide_filename = excluded.slide_filename,
                slide_mimetype = excluded.slide_mimetype,
                logo_blob_key = excluded.logo_blob_key,
                logo_mimetype = excluded.logo_mimetype,
                custom_css_blob_key = excluded.custom_css_blob_key",
            params![
                asset.tenant_uuid.to_string(),
                asset.slide_blob_key,
                asset.slide_filename,
                asset.slide_mimetype,
                asset.logo_blob_key,
                asset.logo_mimetype,
                asset.custom_css_blob_key,
            ],
        )?;
        Ok(())
    }
}

fn parse_uuid(s: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_datetime(s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_cluster(row: &rusqlite::Row) -> rusqlite::Result<Cluster> {
    let algo: String = row.get(6)?;
    Ok(Cluster {
        uuid: parse_uuid(row.get(0)?)?,
        name: row.get(1)?,
        load_a_factor: row.get(2)?,
        load_m_factor: row.get(3)?,
        load_cpu_iterations: row.get(4)?,
        load_cpu_max: row.get(5)?,
        hash_algorithm: ShaAlgorithm::from_name(&algo).unwrap_or(ShaAlgorithm::Sha256),
    })
}

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<Node> {
    Ok(Node {
        uuid: parse_uuid(row.get(0)?)?,
        cluster_uuid: parse_uuid(row.get(1)?)?,
        slug: row.get(2)?,
        domain: row.get(3)?,
        secret: row.get(4)?,
        attendees: row.get(5)?,
        meetings: row.get(6)?,
        cpu_load: row.get(7)?,
        has_errors: row.get(8)?,
        maintenance: row.get(9)?,
    })
}

fn row_to_tenant(row: &rusqlite::Row) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        uuid: parse_uuid(row.get(0)?)?,
        slug: row.get(1)?,
        description: row.get(2)?,
        cluster_group_uuid: parse_uuid(row.get(3)?)?,
        attendee_limit: row.get(4)?,
        meeting_limit: row.get(5)?,
        recording_enabled: row.get(6)?,
        records_hold_time: row.get(7)?,
        stats_token: parse_uuid(row.get(8)?)?,
    })
}

fn row_to_secret(row: &rusqlite::Row) -> rusqlite::Result<Secret> {
    Ok(Secret {
        uuid: parse_uuid(row.get(0)?)?,
        tenant_uuid: parse_uuid(row.get(1)?)?,
        description: row.get(2)?,
        sub_id: row.get(3)?,
        secret: row.get(4)?,
        secret2: row.get(5)?,
        attendee_limit: row.get(6)?,
        meeting_limit: row.get(7)?,
        recording_enabled: row.get(8)?,
        records_hold_time: row.get(9)?,
    })
}

fn row_to_meeting(row: &rusqlite::Row) -> rusqlite::Result<Meeting> {
    Ok(Meeting {
        id: row.get(0)?,
        secret_uuid: parse_uuid(row.get(1)?)?,
        node_uuid: parse_uuid(row.get(2)?)?,
        room_name: row.get(3)?,
        created_at: parse_datetime(row.get(4)?)?,
        attendees: row.get(5)?,
        listener_count: row.get(6)?,
        voice_participant_count: row.get(7)?,
        moderator_count: row.get(8)?,
        video_count: row.get(9)?,
        bbb_origin: row.get(10)?,
        bbb_origin_server_name: row.get(11)?,
        end_callback_url: row.get(12)?,
        nonce: row.get(13)?,
    })
}

fn row_to_record_set(row: &rusqlite::Row) -> rusqlite::Result<RecordSet> {
    let state: String = row.get(3)?;
    let started_at: Option<String> = row.get(10)?;
    let ended_at: Option<String> = row.get(11)?;
    Ok(RecordSet {
        uuid: parse_uuid(row.get(0)?)?,
        secret_uuid: parse_uuid(row.get(1)?)?,
        meeting_id: row.get(2)?,
        state: RecordSetState::from_str(&state).unwrap_or(RecordSetState::Unknown),
        nonce: row.get(4)?,
        recording_ready_origin_url: row.get(5)?,
        created_at: parse_datetime(row.get(6)?)?,
        bbb_origin: row.get(7)?,
        bbb_origin_version: row.get(8)?,
        bbb_origin_server_name: row.get(9)?,
        started_at: started_at.map(parse_datetime).transpose()?,
        ended_at: ended_at.map(parse_datetime).transpose()?,
        participants: row.get(12)?,
        gl_listed: row.get(13)?,
    })
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    Ok(Record {
        uuid: parse_uuid(row.get(0)?)?,
        record_set_uuid: parse_uuid(row.get(1)?)?,
        record_profile_uuid: parse_uuid(row.get(2)?)?,
        file_path: row.get(3)?,
        published: row.get(4)?,
        delivery_nonce: row.get(5)?,
        display_name: row.get(6)?,
    })
}

fn row_to_record_profile(row: &rusqlite::Row) -> rusqlite::Result<RecordProfile> {
    Ok(RecordProfile {
        uuid: parse_uuid(row.get(0)?)?,
        name: row.get(1)?,
        description: row.get(2)?,
        width: row.get(3)?,
        height: row.get(4)?,
        webcam_width: row.get(5)?,
        webcam_height: row.get(6)?,
        webcam_side_by_side: row.get(7)?,
        include_annotations: row.get(8)?,
        container: row.get(9)?,
        extension: row.get(10)?,
        is_default: row.get(11)?,
    })
}

fn row_to_stats(row: &rusqlite::Row) -> rusqlite::Result<Stats> {
    let tenant_uuid: Option<String> = row.get(1)?;
    Ok(Stats {
        uuid: parse_uuid(row.get(0)?)?,
        tenant_uuid: tenant_uuid.map(|s| parse_uuid(s)).transpose()?,
        bbb_origin: row.get(2)?,
        bbb_origin_server_name: row.get(3)?,
        attendees: row.get(4)?,
        meetings: row.get(5)?,
        listener_count: row.get(6)?,
        voice_participant_count: row.get(7)?,
        moderator_count: row.get(8)?,
        video_count: row.get(9)?,
    })
}

fn row_to_parameter(row: &rusqlite::Row) -> rusqlite::Result<Parameter> {
    let mode: String = row.get(2)?;
    Ok(Parameter {
        tenant_uuid: parse_uuid(row.get(0)?)?,
        parameter: row.get(1)?,
        mode: ParameterMode::from_str(&mode).unwrap_or(ParameterMode::Set),
        value: row.get(3)?,
    })
}

fn row_to_asset(row: &rusqlite::Row) -> rusqlite::Result<Asset> {
    Ok(Asset {
        tenant_uuid: parse_uuid(row.get(0)?)?,
        slide_blob_key: row.get(1)?,
        slide_filename: row.get(2)?,
        slide_mimetype: row.get(3)?,
        logo_blob_key: row.get(4)?,
        logo_mimetype: row.get(5)?,
        custom_css_blob_key: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use b3lb_core::model::ClusterGroup;

    fn new_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("test.sqlite3")).unwrap();
        (store, dir)
    }

    fn seed_tenant_chain(store: &Store) -> (Uuid, Uuid) {
        let conn = store.get_connection().unwrap();
        let group = ClusterGroup {
            uuid: Uuid::new_v4(),
            name: "default".into(),
        };
        conn.execute(
            "INSERT INTO cluster_groups (uuid, name) VALUES (?1, ?2)",
            params![group.uuid.to_string(), group.name],
        )
        .unwrap();

        let tenant = Tenant {
            uuid: Uuid::new_v4(),
            slug: "ACME".into(),
            description: String::new(),
            cluster_group_uuid: group.uuid,
            attendee_limit: 0,
            meeting_limit: 0,
            recording_enabled: true,
            records_hold_time: 14,
            stats_token: Uuid::new_v4(),
        };
        store.insert_tenant(&tenant).unwrap();

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
        store.insert_secret(&secret).unwrap();

        (tenant.uuid, secret.uuid)
    }

    #[test]
    fn round_trips_tenant_and_secret() {
        let (store, _dir) = new_store();
        let (tenant_uuid, secret_uuid) = seed_tenant_chain(&store);

        let tenant = store.get_tenant_by_slug("ACME").unwrap();
        assert_eq!(tenant.uuid, tenant_uuid);

        let secret = store.get_secret_by_tenant_and_subid(tenant_uuid, 0).unwrap();
        assert_eq!(secret.uuid, secret_uuid);
    }

    #[test]
    fn metric_counter_accumulates_and_gauge_overwrites() {
        let (store, _dir) = new_store();
        store
            .upsert_metric(MetricName::MeetingsTotal, None, None, 3)
            .unwrap();
        store
            .upsert_metric(MetricName::MeetingsTotal, None, None, 4)
            .unwrap();
        assert_eq!(store.get_metric(MetricName::MeetingsTotal, None, None).unwrap(), 7);

        store.upsert_metric(MetricName::Attendees, None, None, 9).unwrap();
        store.upsert_metric(MetricName::Attendees, None, None, 2).unwrap();
        assert_eq!(store.get_metric(MetricName::Attendees, None, None).unwrap(), 2);
    }

    #[test]
    fn record_set_rejects_illegal_transition() {
        let (store, _dir) = new_store();
        let (_tenant_uuid, secret_uuid) = seed_tenant_chain(&store);

        let rs = RecordSet {
            uuid: Uuid::new_v4(),
            secret_uuid,
            meeting_id: "m1".into(),
            state: RecordSetState::Unknown,
            nonce: "n".into(),
            recording_ready_origin_url: None,
            created_at: Utc::now(),
            bbb_origin: None,
            bbb_origin_version: None,
            bbb_origin_server_name: None,
            started_at: None,
            ended_at: None,
            participants: 0,
            gl_listed: false,
        };
        store.upsert_record_set(&rs).unwrap();

        assert!(store
            .transition_record_set_state(rs.uuid, RecordSetState::Rendered)
            .is_err());
        store
            .transition_record_set_state(rs.uuid, RecordSetState::Uploaded)
            .unwrap();
        store
            .transition_record_set_state(rs.uuid, RecordSetState::Rendered)
            .unwrap();
        assert_eq!(store.get_record_set(rs.uuid).unwrap().state, RecordSetState::Rendered);
    }

    #[test]
    fn meeting_upsert_is_idempotent_on_conflict() {
        let (store, _dir) = new_store();
        let (_tenant_uuid, secret_uuid) = seed_tenant_chain(&store);
        let node_uuid = Uuid::new_v4();

        let meeting = Meeting {
            id: "m1".into(),
            secret_uuid,
            node_uuid,
            room_name: "room".into(),
            created_at: Utc::now(),
            attendees: 1,
            listener_count: 0,
            voice_participant_count: 0,
            moderator_count: 1,
            video_count: 0,
            bbb_origin: String::new(),
            bbb_origin_server_name: String::new(),
            end_callback_url: String::new(),
            nonce: "n1".into(),
        };
        store.upsert_meeting(&meeting).unwrap();

        let mut updated = meeting.clone();
        updated.attendees = 5;
        store.upsert_meeting(&updated).unwrap();

        let fetched = store.get_meeting("m1", secret_uuid).unwrap();
        assert_eq!(fetched.attendees, 5);

        let (count, attendees) = store
            .count_meetings_and_attendees_for_secret(secret_uuid)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(attendees, 5);
    }

    fn profile(name: &str, is_default: bool) -> RecordProfile {
        RecordProfile {
            uuid: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            width: 1280,
            height: 720,
            webcam_width: 320,
            webcam_height: 240,
            webcam_side_by_side: false,
            include_annotations: true,
            container: "mp4".into(),
            extension: "mp4".into(),
            is_default,
        }
    }

    #[test]
    fn record_profiles_for_secret_falls_back_to_defaults() {
        let (store, _dir) = new_store();
        let (_tenant_uuid, secret_uuid) = seed_tenant_chain(&store);

        let default_profile = profile("default", true);
        let opt_in_profile = profile("hd", false);
        store.upsert_record_profile(&default_profile).unwrap();
        store.upsert_record_profile(&opt_in_profile).unwrap();

        let fallback = store.list_record_profiles_for_secret(secret_uuid).unwrap();
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].uuid, default_profile.uuid);

        store
            .add_secret_record_profile_relation(secret_uuid, opt_in_profile.uuid)
            .unwrap();
        let opted_in = store.list_record_profiles_for_secret(secret_uuid).unwrap();
        assert_eq!(opted_in.len(), 1);
        assert_eq!(opted_in[0].uuid, opt_in_profile.uuid);
    }

    #[test]
    fn list_all_tenants_returns_every_row() {
        let (store, _dir) = new_store();
        seed_tenant_chain(&store);
        assert_eq!(store.list_all_tenants().unwrap().len(), 1);
    }
}
