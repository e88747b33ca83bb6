//! Recording lifecycle: RecordSet creation, the end-callback that closes a
//! meeting's capture window, raw-archive upload, profile rendering, the
//! retention sweep, and delivery of a rendered file by its nonce.

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use b3lb_core::error::{B3lbError, Result};
use b3lb_core::model::{Record, RecordProfile, RecordSet, RecordSetState, Secret, Tenant};
use b3lb_core::nonce::generate_nonce;
use b3lb_storage::{BlobStore, Renderer, Store};

/// Inserts a RecordSet in `Unknown` state; its nonce is what the node
/// echoes back on `meta_<slug>-recordset` and later on upload/end.
/// `recording_ready_origin_url` carries the caller's `meta_bbb-recording-ready-url`
/// through so `render_record_set` can fire it once rendering finishes.
pub fn create_record_set(
    store: &Store,
    secret_uuid: Uuid,
    meeting_id: &str,
    recording_ready_origin_url: Option<String>,
) -> Result<RecordSet> {
    let record_set = RecordSet {
        uuid: Uuid::new_v4(),
        secret_uuid,
        meeting_id: meeting_id.to_string(),
        state: RecordSetState::Unknown,
        nonce: generate_nonce(b3lb_core::canned::NONCE_LENGTH),
        recording_ready_origin_url,
        created_at: Utc::now(),
        bbb_origin: None,
        bbb_origin_version: None,
        bbb_origin_server_name: None,
        started_at: None,
        ended_at: None,
        participants: 0,
        gl_listed: false,
    };
    store.upsert_record_set(&record_set)?;
    Ok(record_set)
}

/// Closes a meeting: deletes the Meeting row, and if `recordingmarks` is
/// false the RecordSet is discarded outright rather than left to upload.
/// Returns the caller's original end-callback URL (with `meetingID` and
/// `recordingmarks` appended) for fire-and-forget delivery, if one was set.
pub fn handle_end_callback(
    store: &Store,
    meeting_id: &str,
    secret_uuid: Uuid,
    nonce: &str,
    recording_marks: bool,
) -> Result<Option<String>> {
    let meeting = store.get_meeting(meeting_id, secret_uuid)?;
    if meeting.nonce != nonce {
        return Err(B3lbError::AuthFailure("end callback nonce mismatch".into()));
    }

    if !recording_marks {
        if let Ok(record_set) = store.get_record_set_by_nonce(nonce) {
            store.delete_record_set(record_set.uuid)?;
        }
    }

    store.delete_meeting(meeting_id, secret_uuid)?;

    if meeting.end_callback_url.is_empty() {
        return Ok(None);
    }
    let separator = if meeting.end_callback_url.contains('?') { '&' } else { '?' };
    Ok(Some(format!(
        "{}{}meetingID={}&recordingmarks={}",
        meeting.end_callback_url,
        separator,
        urlencoding::encode(meeting_id),
        recording_marks,
    )))
}

/// Metadata parsed out of the uploaded archive's `meta` part. The field
/// names mirror the attributes BigBlueButton's `post_publish` script
/// writes into `metadata.xml`.
#[derive(Debug, Default)]
pub struct UploadMetadata {
    pub bbb_origin: Option<String>,
    pub bbb_origin_version: Option<String>,
    pub bbb_origin_server_name: Option<String>,
    pub participants: i64,
    pub gl_listed: bool,
}

/// Saves the raw tar under the RecordSet's blob hierarchy and transitions
/// it to `Uploaded`. Rejects uploads for breakout-room record sets, which
/// callers must filter out before invoking this (no `is_breakout` field
/// exists on RecordSet; breakout detection happens against the Meeting
/// census upstream of this call).
pub async fn accept_upload(
    store: &Store,
    blob: &dyn BlobStore,
    nonce: &str,
    raw_tar: &[u8],
    metadata: UploadMetadata,
    path_width: usize,
    path_depth: usize,
) -> Result<RecordSet> {
    let mut record_set = store.get_record_set_by_nonce(nonce)?;
    if record_set.state != RecordSetState::Unknown {
        return Err(B3lbError::ValidationError(format!(
            "record set {} already uploaded",
            record_set.uuid
        )));
    }

    let key = format!("{}/raw.tar", record_set.blob_path(path_width, path_depth));
    blob.put(&key, raw_tar).await?;

    record_set.bbb_origin = metadata.bbb_origin;
    record_set.bbb_origin_version = metadata.bbb_origin_version;
    record_set.bbb_origin_server_name = metadata.bbb_origin_server_name;
    record_set.participants = metadata.participants;
    record_set.gl_listed = metadata.gl_listed;
    store.upsert_record_set(&record_set)?;
    store.transition_record_set_state(record_set.uuid, RecordSetState::Uploaded)?;
    record_set.state = RecordSetState::Uploaded;
    Ok(record_set)
}

/// Runs the renderer over every profile the owning Secret opted into (or
/// every default profile if it opted into none), registers one `Record`
/// per output, and transitions the RecordSet to `Rendered`.
pub async fn render_record_set(
    store: &Store,
    renderer: &dyn Renderer,
    record_set_uuid: Uuid,
    profiles: &[RecordProfile],
    path_width: usize,
    path_depth: usize,
) -> Result<Vec<Record>> {
    let record_set = store.get_record_set(record_set_uuid)?;
    if record_set.state != RecordSetState::Uploaded {
        return Err(B3lbError::ValidationError(format!(
            "record set {} is not in uploaded state",
            record_set_uuid
        )));
    }

    let raw_key = format!("{}/raw.tar", record_set.blob_path(path_width, path_depth));
    let outputs = renderer.render(record_set_uuid, &raw_key, profiles).await?;

    let mut records = Vec::with_capacity(outputs.len());
    for output in outputs {
        let record = Record {
            uuid: Uuid::new_v4(),
            record_set_uuid,
            record_profile_uuid: output.record_profile_uuid,
            file_path: output.file_path,
            published: true,
            delivery_nonce: generate_nonce(b3lb_core::canned::NONCE_LENGTH),
            display_name: output.display_name,
        };
        store.insert_record(&record)?;
        records.push(record);
    }

    store.transition_record_set_state(record_set_uuid, RecordSetState::Rendered)?;
    Ok(records)
}

/// Builds the fire-and-forget recording-ready URL for a just-rendered
/// RecordSet, appending `meetingID`/`recordID` the way the end-callback URL
/// carries its own query params. `None` if the caller never asked for one.
pub fn recording_ready_callback_url(record_set: &RecordSet) -> Option<String> {
    let base = record_set.recording_ready_origin_url.as_ref()?;
    let separator = if base.contains('?') { '&' } else { '?' };
    Some(format!(
        "{base}{separator}meetingID={}&recordID={}",
        urlencoding::encode(&record_set.meeting_id),
        record_set.uuid,
    ))
}

/// Deletes any RecordSet whose age exceeds its owning Secret/Tenant pair's
/// effective hold time, cascading to its Records and their blobs.
/// `candidate_floor_days` bounds the initial SQL scan to the longest
/// hold time any tenant in this deployment could plausibly configure;
/// callers pass the maximum `records_hold_time` across all tenants, or a
/// generous default if unknown.
pub async fn sweep_retention(
    store: &Store,
    blob: &dyn BlobStore,
    candidate_floor_days: i64,
    path_width: usize,
    path_depth: usize,
) -> Result<usize> {
    let cutoff = Utc::now() - ChronoDuration::days(candidate_floor_days);
    let candidates = store.list_record_sets_older_than(cutoff)?;

    let mut deleted = 0usize;
    for record_set in candidates {
        let secret = store.get_secret(record_set.secret_uuid)?;
        let tenant = store.get_tenant(secret.tenant_uuid)?;
        if !is_past_hold_time(&record_set, &secret, &tenant) {
            continue;
        }

        store.transition_record_set_state(record_set.uuid, RecordSetState::Deleting)?;

        for record in store.list_records_by_record_set(record_set.uuid)? {
            blob.delete(&record.file_path).await?;
            store.delete_record(record.uuid)?;
        }
        let raw_key = format!("{}/raw.tar", record_set.blob_path(path_width, path_depth));
        blob.delete(&raw_key).await?;
        store.delete_record_set(record_set.uuid)?;
        deleted += 1;
    }
    Ok(deleted)
}

fn is_past_hold_time(record_set: &RecordSet, secret: &Secret, tenant: &Tenant) -> bool {
    let hold_days = secret.records_effective_hold_time(tenant);
    let age = Utc::now() - record_set.created_at;
    age >= ChronoDuration::days(hold_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use b3lb_core::model::{Meeting, Secret, Tenant};
    use b3lb_storage::{LocalBlobStore, NullRenderer};

    fn seed_chain(store: &Store) -> (Tenant, Secret) {
        let conn = store.get_connection().unwrap();
        let cluster_group_uuid = Uuid::new_v4();
        conn.execute(
            "INSERT INTO cluster_groups (uuid, name) VALUES (?1, 'g')",
            [cluster_group_uuid.to_string()],
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
            records_hold_time: 1,
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
            records_hold_time: 1,
        };
        store.insert_tenant(&tenant).unwrap();
        store.insert_secret(&secret).unwrap();
        (tenant, secret)
    }

    #[test]
    fn create_record_set_starts_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let (_, secret) = seed_chain(&store);

        let rs = create_record_set(&store, secret.uuid, "meeting-1", None).unwrap();
        assert_eq!(rs.state, RecordSetState::Unknown);
        assert!(!rs.nonce.is_empty());
    }

    #[test]
    fn recording_ready_callback_url_appends_ids_when_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let (_, secret) = seed_chain(&store);

        let without = create_record_set(&store, secret.uuid, "m1", None).unwrap();
        assert!(recording_ready_callback_url(&without).is_none());

        let with = create_record_set(
            &store,
            secret.uuid,
            "m1",
            Some("https://caller.example/ready?x=1".into()),
        )
        .unwrap();
        let url = recording_ready_callback_url(&with).unwrap();
        assert!(url.starts_with("https://caller.example/ready?x=1&meetingID=m1&recordID="));
    }

    #[test]
    fn end_callback_rejects_nonce_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let (_, secret) = seed_chain(&store);
        store
            .upsert_meeting(&Meeting {
                id: "m1".into(),
                secret_uuid: secret.uuid,
                node_uuid: Uuid::new_v4(),
                room_name: "room".into(),
                created_at: Utc::now(),
                attendees: 0,
                listener_count: 0,
                voice_participant_count: 0,
                moderator_count: 0,
                video_count: 0,
                bbb_origin: String::new(),
                bbb_origin_server_name: String::new(),
                end_callback_url: "https://caller.example/end".into(),
                nonce: "correct".into(),
            })
            .unwrap();

        let err = handle_end_callback(&store, "m1", secret.uuid, "wrong", true).unwrap_err();
        assert!(matches!(err, B3lbError::AuthFailure(_)));
    }

    #[test]
    fn end_callback_deletes_meeting_and_appends_params() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let (_, secret) = seed_chain(&store);
        store
            .upsert_meeting(&Meeting {
                id: "m1".into(),
                secret_uuid: secret.uuid,
                node_uuid: Uuid::new_v4(),
                room_name: "room".into(),
                created_at: Utc::now(),
                attendees: 0,
                listener_count: 0,
                voice_participant_count: 0,
                moderator_count: 0,
                video_count: 0,
                bbb_origin: String::new(),
                bbb_origin_server_name: String::new(),
                end_callback_url: "https://caller.example/end".into(),
                nonce: "correct".into(),
            })
            .unwrap();

        let callback_url = handle_end_callback(&store, "m1", secret.uuid, "correct", true)
            .unwrap()
            .unwrap();
        assert!(callback_url.contains("meetingID=m1"));
        assert!(callback_url.contains("recordingmarks=true"));
        assert!(store.get_meeting("m1", secret.uuid).is_err());
    }

    #[tokio::test]
    async fn upload_then_render_produces_published_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let (_, secret) = seed_chain(&store);
        let blob = LocalBlobStore::new(dir.path().join("blobs"));
        let renderer = NullRenderer;

        let record_set = create_record_set(&store, secret.uuid, "m1", None).unwrap();
        let uploaded = accept_upload(
            &store,
            &blob,
            &record_set.nonce,
            b"fake tar bytes",
            UploadMetadata {
                participants: 3,
                gl_listed: true,
                ..Default::default()
            },
            2,
            2,
        )
        .await
        .unwrap();
        assert_eq!(uploaded.state, RecordSetState::Uploaded);

        let records = render_record_set(&store, &renderer, record_set.uuid, &[], 2, 2)
            .await
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(
            store.get_record_set(record_set.uuid).unwrap().state,
            RecordSetState::Rendered
        );
    }

    #[tokio::test]
    async fn retention_sweep_deletes_expired_record_sets() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let (_, secret) = seed_chain(&store);
        let blob = LocalBlobStore::new(dir.path().join("blobs"));

        let mut record_set = create_record_set(&store, secret.uuid, "m1", None).unwrap();
        record_set.created_at = Utc::now() - ChronoDuration::days(10);
        store.upsert_record_set(&record_set).unwrap();

        let deleted = sweep_retention(&store, &blob, 1, 2, 2).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_record_set(record_set.uuid).is_err());
    }

    #[tokio::test]
    async fn retention_sweep_ignores_fresh_record_sets() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let (_, secret) = seed_chain(&store);
        let blob = LocalBlobStore::new(dir.path().join("blobs"));

        let record_set = create_record_set(&store, secret.uuid, "m1", None).unwrap();
        let deleted = sweep_retention(&store, &blob, 0, 2, 2).await.unwrap();
        assert_eq!(deleted, 0);
        assert!(store.get_record_set(record_set.uuid).is_ok());
    }
}
