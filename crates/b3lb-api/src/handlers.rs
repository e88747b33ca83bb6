//! HTTP surface: the backend-protocol dispatch table plus the b3lb-native
//! endpoints (recording callbacks, stats, assets). Wired into a `Router` by
//! `main.rs`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use b3lb_core::canned;
use b3lb_core::error::B3lbError;
use b3lb_core::model::RecordSetState;
use b3lb_core::nonce::generate_nonce;
use b3lb_core::signing::{encode_query_string, sign_outbound, verify_checksum};
use b3lb_storage::{BlobStore, Renderer, Store};

use crate::protocol::{
    create_success_xml, get_meetings_xml, is_meeting_running_xml, meeting_info_xml,
    parse_query_pairs, strip_checksum,
};
use crate::{aggregation, assets, counters, node_selector, policy, recording, tenant_resolver};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub blob: Arc<dyn BlobStore>,
    pub renderer: Arc<dyn Renderer>,
    pub http: reqwest::Client,
    pub api_base_domain: String,
    pub path_hierarchy_width: usize,
    pub path_hierarchy_depth: usize,
}

fn xml_response(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [("content-type", canned::CONTENT_TYPE_XML)],
        body.into(),
    )
        .into_response()
}

/// Maps a domain error to the canned XML body callers of the backend
/// protocol expect; unrecognized endpoints never reach this path.
fn error_xml(err: &B3lbError) -> Response {
    match err {
        B3lbError::LimitFailure(_) => xml_response(StatusCode::OK, canned::CREATE_LIMIT_REACHED),
        B3lbError::NoCapacity(_) => xml_response(StatusCode::OK, canned::CREATE_NO_NODE_AVAILABLE),
        B3lbError::NotFound(_) => xml_response(StatusCode::OK, canned::GET_MEETING_INFO_FALSE),
        B3lbError::AuthFailure(_) => xml_response(StatusCode::UNAUTHORIZED, ""),
        B3lbError::ValidationError(msg) => xml_response(
            StatusCode::OK,
            format!(
                "<response>\r\n<returncode>FAILED</returncode>\r\n<message>{}</message>\r\n</response>",
                msg
            ),
        ),
        _ => xml_response(StatusCode::INTERNAL_SERVER_ERROR, ""),
    }
}

fn extract_host(headers: &HeaderMap) -> Option<&str> {
    headers.get("host").and_then(|v| v.to_str().ok())
}

/// `GET|POST /bigbluebutton/api/:endpoint` and the path-scoped equivalent.
/// The raw path is passed through so `tenant_resolver` can fall back to its
/// path pattern when the `Host` header carries no tenant slug.
pub async fn bbb_api(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::RawQuery(raw_query): axum::extract::RawQuery,
    uri: axum::http::Uri,
    _body: Bytes,
) -> Response {
    let raw_query = raw_query.unwrap_or_default();
    let host = extract_host(&headers);
    let endpoint = uri
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    let resolved = match tenant_resolver::resolve(&state.store, host, uri.path()) {
        Ok(r) => r,
        Err(e) => return error_xml(&e),
    };

    let (query_for_checksum, checksum, checksum_hash) = strip_checksum(&raw_query);
    let checksum = match checksum {
        Some(c) => c,
        None => return error_xml(&B3lbError::AuthFailure("missing checksum".into())),
    };
    if let Err(e) = verify_checksum(
        &endpoint,
        &query_for_checksum,
        &checksum,
        checksum_hash.as_deref(),
        &resolved.secret.secret,
        &resolved.secret.secret2,
    ) {
        return error_xml(&e);
    }

    let params = parse_query_pairs(&raw_query);

    match endpoint.as_str() {
        "" | "version" => xml_response(StatusCode::OK, canned::VERSION),
        "create" => handle_create(&state, &resolved.tenant, &resolved.secret, params).await,
        "join" => handle_join(&state, &resolved.tenant, &resolved.secret, params, &query_for_checksum).await,
        "isMeetingRunning" => handle_is_meeting_running(&state, resolved.secret.uuid, &params),
        "getMeetingInfo" => handle_get_meeting_info(&state, resolved.secret.uuid, &params),
        "getMeetings" => handle_get_meetings(&state, resolved.secret.uuid),
        "getRecordings" => handle_get_recordings(&state, resolved.secret.uuid, &params),
        "publishRecordings" => handle_publish_recordings(&state, resolved.secret.uuid, &params),
        "deleteRecordings" => handle_delete_recordings(&state, resolved.secret.uuid, &params).await,
        "updateRecordings" => handle_update_recordings(&state, resolved.secret.uuid, &params),
        _ => xml_response(StatusCode::FORBIDDEN, ""),
    }
}

async fn handle_create(
    state: &AppState,
    tenant: &b3lb_core::model::Tenant,
    secret: &b3lb_core::model::Secret,
    params: Vec<(String, String)>,
) -> Response {
    let meeting_id = params
        .iter()
        .find(|(k, _)| k == "meetingID")
        .map(|(_, v)| v.clone());
    let Some(meeting_id) = meeting_id else {
        return xml_response(StatusCode::OK, canned::MISSING_MEETING_ID);
    };
    if let Err(e) = b3lb_core::validation::validate_meeting_id(&meeting_id) {
        return error_xml(&e);
    }

    let (current_meetings, current_attendees) = match state
        .store
        .count_meetings_and_attendees_for_secret(secret.uuid)
    {
        Ok(v) => v,
        Err(e) => return error_xml(&e),
    };
    if let Err(e) = node_selector::check_limits(tenant, secret, current_meetings, current_attendees) {
        let _ = counters::record_meeting_limit_hit(&state.store, secret.uuid);
        return error_xml(&e);
    }

    let nodes = match state.store.list_nodes_for_cluster_group(tenant.cluster_group_uuid) {
        Ok(n) => n,
        Err(e) => return error_xml(&e),
    };
    let Some(node) = node_selector::select(&nodes) else {
        return error_xml(&B3lbError::NoCapacity("no eligible node".into()));
    };
    let cluster = match state.store.get_cluster(node.cluster_uuid) {
        Ok(c) => c,
        Err(e) => return error_xml(&e),
    };

    let policies = state.store.list_parameters_for_tenant(tenant.uuid).unwrap_or_default();
    let mut filtered = policy::apply(
        params,
        &policies,
        b3lb_core::parameters::PARAMETERS_CREATE,
        b3lb_core::parameters::CREATE_FORCE_DROP,
    );

    let meeting_nonce = generate_nonce(canned::NONCE_LENGTH);
    filtered.push((
        "meta_endCallbackUrl".to_string(),
        format!("https://{}/b3lb/b/meeting/end?nonce={}", state.api_base_domain, meeting_nonce),
    ));

    let asset = state.store.get_asset(tenant.uuid).unwrap_or(b3lb_core::model::Asset {
        tenant_uuid: tenant.uuid,
        ..Default::default()
    });

    if asset.logo_blob_key.is_some() && !filtered.iter().any(|(k, _)| k == "logo") {
        filtered.push(("logo".to_string(), assets::logo_url(&state.api_base_domain, &tenant.slug)));
    }

    // Custom slide: converts the upstream call from GET to POST, carrying the
    // module XML as the body. Inline base64 when it fits the POST body cap,
    // else a URL reference to the asset-serving route.
    let mut post_body: Option<String> = None;
    if let Some(slide_key) = &asset.slide_blob_key {
        let filename = asset.slide_filename.clone().unwrap_or_default();
        if let Ok(data) = state.blob.get(slide_key).await {
            post_body = Some(match assets::encode_slide_for_inline_injection(&data) {
                Ok(b64) => format!(
                    "<modules><module name=\"presentation\"><document name=\"{filename}\">{b64}</document></module></modules>"
                ),
                Err(_) => format!(
                    "<modules><module name=\"presentation\"><document url=\"{}\" filename=\"{filename}\"></document></module></modules>",
                    assets::slide_url(&state.api_base_domain, &tenant.slug)
                ),
            });
        }
    }

    let record_enabled = secret.is_record_enabled(tenant);
    let mut record_set_uuid = None;
    if record_enabled {
        let recording_ready_url = filtered
            .iter()
            .position(|(k, _)| k == "meta_bbb-recording-ready-url")
            .map(|i| filtered.remove(i).1);
        match recording::create_record_set(&state.store, secret.uuid, &meeting_id, recording_ready_url) {
            Ok(rs) => {
                filtered.push((format!("meta_{}-recordset", tenant.slug.to_lowercase()), rs.nonce.clone()));
                record_set_uuid = Some(rs.uuid);
            }
            Err(e) => return error_xml(&e),
        }
    } else {
        filtered.retain(|(k, _)| !matches!(k.as_str(), "record" | "allowStartStopRecording" | "autoStartRecording"));
        filtered.push(("record".to_string(), "false".to_string()));
        filtered.push(("allowStartStopRecording".to_string(), "false".to_string()));
        filtered.push(("autoStartRecording".to_string(), "false".to_string()));
    }

    let query_string = encode_query_string(&filtered);
    let checksum = sign_outbound("create", &query_string, &node.secret, cluster.hash_algorithm);
    let url = format!("https://{}/bigbluebutton/api/create?{}&checksum={}", node.domain, query_string, checksum);

    let upstream_result = match &post_body {
        Some(body) => {
            state
                .http
                .post(&url)
                .header("content-type", "application/xml")
                .body(body.clone())
                .send()
                .await
        }
        None => state.http.get(&url).send().await,
    };

    match upstream_result {
        Ok(upstream) if upstream.status().is_success() => {
            if let Err(e) = state.store.upsert_meeting(&b3lb_core::model::Meeting {
                id: meeting_id.clone(),
                secret_uuid: secret.uuid,
                node_uuid: node.uuid,
                room_name: meeting_id.clone(),
                created_at: chrono::Utc::now(),
                attendees: 0,
                listener_count: 0,
                voice_participant_count: 0,
                moderator_count: 0,
                video_count: 0,
                bbb_origin: String::new(),
                bbb_origin_server_name: String::new(),
                end_callback_url: String::new(),
                nonce: meeting_nonce,
            }) {
                return error_xml(&e);
            }
            let _ = counters::record_meeting_created(&state.store, secret.uuid, node.uuid);
            let _ = record_set_uuid;
            xml_response(
                StatusCode::OK,
                create_success_xml(&meeting_id, "attendee-pw", "moderator-pw"),
            )
        }
        Ok(upstream) => xml_response(
            StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            "",
        ),
        Err(_) => error_xml(&B3lbError::Upstream("create request to node failed".into())),
    }
}

async fn handle_join(
    state: &AppState,
    tenant: &b3lb_core::model::Tenant,
    secret: &b3lb_core::model::Secret,
    params: Vec<(String, String)>,
    query_for_checksum: &str,
) -> Response {
    let meeting_id = params.iter().find(|(k, _)| k == "meetingID").map(|(_, v)| v.clone());
    let Some(meeting_id) = meeting_id else {
        return xml_response(StatusCode::OK, canned::MISSING_MEETING_ID);
    };

    let meeting = match state.store.get_meeting(&meeting_id, secret.uuid) {
        Ok(m) => m,
        Err(_) => return xml_response(StatusCode::OK, canned::GET_MEETING_INFO_FALSE),
    };
    let node = match state.store.get_node(meeting.node_uuid) {
        Ok(n) => n,
        Err(e) => return error_xml(&e),
    };
    if node.has_errors {
        return xml_response(StatusCode::OK, canned::GET_MEETING_INFO_FALSE);
    }
    let cluster = match state.store.get_cluster(node.cluster_uuid) {
        Ok(c) => c,
        Err(e) => return error_xml(&e),
    };

    let policies = state.store.list_parameters_for_tenant(tenant.uuid).unwrap_or_default();
    let mut filtered = policy::apply(params, &policies, b3lb_core::parameters::PARAMETERS_JOIN, &[]);

    if !filtered.iter().any(|(k, _)| k == "userdata-bbb_custom_style_url") {
        if let Ok(asset) = state.store.get_asset(tenant.uuid) {
            if asset.custom_css_blob_key.is_some() {
                filtered.push((
                    "userdata-bbb_custom_style_url".to_string(),
                    assets::custom_css_url(&state.api_base_domain, &tenant.slug),
                ));
            }
        }
    }

    let query_string = encode_query_string(&filtered);
    let checksum = sign_outbound("join", &query_string, &node.secret, cluster.hash_algorithm);
    let _ = query_for_checksum;
    let redirect = crate::protocol::join_redirect_url(&node.domain, "join", &query_string, &checksum);

    let _ = counters::record_attendee_joined(&state.store, secret.uuid, node.uuid);
    axum::response::Redirect::to(&redirect).into_response()
}

fn handle_is_meeting_running(state: &AppState, secret_uuid: Uuid, params: &[(String, String)]) -> Response {
    let meeting_id = params.iter().find(|(k, _)| k == "meetingID").map(|(_, v)| v.as_str());
    let Some(meeting_id) = meeting_id else {
        return xml_response(StatusCode::OK, canned::MISSING_MEETING_ID);
    };
    let running = state.store.get_meeting(meeting_id, secret_uuid).is_ok();
    xml_response(StatusCode::OK, is_meeting_running_xml(running))
}

fn handle_get_meeting_info(state: &AppState, secret_uuid: Uuid, params: &[(String, String)]) -> Response {
    let meeting_id = params.iter().find(|(k, _)| k == "meetingID").map(|(_, v)| v.as_str());
    let Some(meeting_id) = meeting_id else {
        return xml_response(StatusCode::OK, canned::MISSING_MEETING_ID);
    };
    match state.store.get_meeting(meeting_id, secret_uuid) {
        Ok(meeting) => xml_response(StatusCode::OK, meeting_info_xml(&meeting)),
        Err(_) => xml_response(StatusCode::OK, canned::GET_MEETING_INFO_FALSE),
    }
}

fn handle_get_meetings(state: &AppState, secret_uuid: Uuid) -> Response {
    match state.store.list_meetings_by_secret(secret_uuid) {
        Ok(meetings) => {
            let _ = aggregation::rebuild_secret_meeting_list(&state.store, secret_uuid);
            xml_response(StatusCode::OK, get_meetings_xml(&meetings))
        }
        Err(e) => error_xml(&e),
    }
}

fn handle_get_recordings(state: &AppState, secret_uuid: Uuid, params: &[(String, String)]) -> Response {
    let record_sets = match state.store.list_record_sets_by_secret(secret_uuid) {
        Ok(r) => r,
        Err(e) => return error_xml(&e),
    };

    let meeting_filter: Vec<&str> = params
        .iter()
        .filter(|(k, _)| k == "meetingID")
        .flat_map(|(_, v)| v.split(','))
        .collect();
    let record_id_filter: Vec<Uuid> = params
        .iter()
        .filter(|(k, _)| k == "recordID")
        .flat_map(|(_, v)| v.split(','))
        .filter_map(|s| Uuid::parse_str(s).ok())
        .collect();

    let matches: Vec<_> = record_sets
        .into_iter()
        .filter(|rs| meeting_filter.is_empty() || meeting_filter.contains(&rs.meeting_id.as_str()))
        .filter(|rs| record_id_filter.is_empty() || record_id_filter.contains(&rs.uuid))
        .collect();

    if matches.is_empty() {
        return xml_response(StatusCode::OK, canned::GET_RECORDINGS_NO_RECORDINGS);
    }

    let body: String = matches
        .iter()
        .map(|rs| format!("<recording>\r\n<recordID>{}</recordID>\r\n<meetingID>{}</meetingID>\r\n<state>{}</state>\r\n</recording>\r\n", rs.uuid, rs.meeting_id, rs.state.as_str().to_lowercase()))
        .collect();
    xml_response(
        StatusCode::OK,
        format!("<response>\r\n<returncode>SUCCESS</returncode>\r\n<recordings>\r\n{}</recordings>\r\n</response>", body),
    )
}

fn handle_publish_recordings(state: &AppState, secret_uuid: Uuid, params: &[(String, String)]) -> Response {
    set_publish_flag(state, secret_uuid, params, true)
}

/// Deletes a RecordSet and cascades to its blobs, mirroring
/// `recording::sweep_retention`'s cleanup order: transition to `Deleting`
/// first so a crash mid-delete can't leave a `Rendered` row pointing at
/// blobs that are already gone.
async fn handle_delete_recordings(state: &AppState, secret_uuid: Uuid, params: &[(String, String)]) -> Response {
    let Some(record_id) = params.iter().find(|(k, _)| k == "recordID").map(|(_, v)| v.as_str()) else {
        return xml_response(StatusCode::OK, canned::MISSING_RECORD_ID);
    };
    let Ok(uuid) = Uuid::parse_str(record_id) else {
        return xml_response(StatusCode::OK, canned::MISSING_RECORD_ID);
    };
    match state.store.get_record_set(uuid) {
        Ok(rs) if rs.secret_uuid == secret_uuid => {
            if let Err(e) = state.store.transition_record_set_state(uuid, RecordSetState::Deleting) {
                return error_xml(&e);
            }
            for record in state.store.list_records_by_record_set(uuid).unwrap_or_default() {
                if let Err(e) = state.blob.delete(&record.file_path).await {
                    tracing::warn!("failed to delete record blob {}: {e}", record.file_path);
                }
                let _ = state.store.delete_record(record.uuid);
            }
            let raw_key = format!("{}/raw.tar", rs.blob_path(state.path_hierarchy_width, state.path_hierarchy_depth));
            if let Err(e) = state.blob.delete(&raw_key).await {
                tracing::warn!("failed to delete raw archive {raw_key}: {e}");
            }
            let _ = state.store.delete_record_set(uuid);
            xml_response(StatusCode::OK, canned::RECORD_DELETED)
        }
        _ => xml_response(StatusCode::OK, canned::MISSING_RECORD_ID),
    }
}

/// Sets `meta_name` as the `display_name` on every Record under a RecordSet
/// the caller's Secret owns. Other `meta_*` fields aren't modeled per-Record
/// (only `display_name` is), so `meta_name` is the only one honored.
fn handle_update_recordings(state: &AppState, secret_uuid: Uuid, params: &[(String, String)]) -> Response {
    let Some(record_id) = params.iter().find(|(k, _)| k == "recordID").map(|(_, v)| v.as_str()) else {
        return xml_response(StatusCode::OK, canned::MISSING_RECORD_ID);
    };
    let Ok(uuid) = Uuid::parse_str(record_id) else {
        return xml_response(StatusCode::OK, canned::MISSING_RECORD_ID);
    };
    match state.store.get_record_set(uuid) {
        Ok(rs) if rs.secret_uuid == secret_uuid => {
            if let Some(display_name) = params.iter().find(|(k, _)| k == "meta_name").map(|(_, v)| v.as_str()) {
                for record in state.store.list_records_by_record_set(uuid).unwrap_or_default() {
                    let _ = state.store.update_record_display_name(record.uuid, display_name);
                }
            }
            xml_response(StatusCode::OK, canned::RECORD_UPDATED)
        }
        _ => xml_response(StatusCode::OK, canned::MISSING_RECORD_ID),
    }
}

fn set_publish_flag(state: &AppState, secret_uuid: Uuid, params: &[(String, String)], _publish_endpoint: bool) -> Response {
    let Some(record_id) = params.iter().find(|(k, _)| k == "recordID").map(|(_, v)| v.as_str()) else {
        return xml_response(StatusCode::OK, canned::MISSING_RECORD_ID);
    };
    let Some(publish) = params.iter().find(|(k, _)| k == "publish").map(|(_, v)| v == "true") else {
        return xml_response(StatusCode::OK, canned::MISSING_RECORD_PUBLISH);
    };
    let Ok(uuid) = Uuid::parse_str(record_id) else {
        return xml_response(StatusCode::OK, canned::MISSING_RECORD_ID);
    };
    match state.store.get_record_set(uuid) {
        Ok(rs) if rs.secret_uuid == secret_uuid => {
            for record in state.store.list_records_by_record_set(uuid).unwrap_or_default() {
                let _ = state.store.set_record_published(record.uuid, publish);
            }
            xml_response(StatusCode::OK, canned::record_published(publish))
        }
        _ => xml_response(StatusCode::OK, canned::MISSING_RECORD_ID),
    }
}

#[derive(Debug, Deserialize)]
pub struct EndCallbackQuery {
    pub nonce: String,
    #[serde(rename = "meetingID")]
    pub meeting_id: String,
    #[serde(default)]
    pub recordingmarks: bool,
}

/// `GET /b3lb/b/meeting/end` — always 204, per the protocol's fire-and-forget
/// contract with the capture node.
pub async fn meeting_end(
    State(state): State<AppState>,
    Query(q): Query<EndCallbackQuery>,
) -> StatusCode {
    let Ok(meeting) = state.store.get_meeting_any_secret(&q.meeting_id) else {
        return StatusCode::NO_CONTENT;
    };
    let secret_uuid = meeting.secret_uuid;

    if let Ok(Some(callback_url)) =
        recording::handle_end_callback(&state.store, &q.meeting_id, secret_uuid, &q.nonce, q.recordingmarks)
    {
        let http = state.http.clone();
        tokio::spawn(async move {
            if let Err(e) = http.get(&callback_url).send().await {
                tracing::warn!("end callback delivery failed: {e}");
            }
        });
    }
    StatusCode::NO_CONTENT
}

/// `GET /b3lb/r/:nonce` — streams a rendered Record by its delivery nonce.
pub async fn deliver_record(State(state): State<AppState>, Path(nonce): Path<String>) -> Response {
    let record = match state.store.get_record_by_delivery_nonce(&nonce) {
        Ok(r) => r,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    match state.blob.get(&record.file_path).await {
        Ok(data) => (
            [(
                "content-disposition",
                format!("attachment; filename=\"video.{}\"", record.file_path.rsplit('.').next().unwrap_or("bin")),
            )],
            data,
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `POST /b3lb/b/record/upload` — the capture node's `post_publish` hook
/// posts the raw tar and a few metadata fields as multipart parts. Always
/// 204: a malformed or duplicate upload isn't retried by the node either
/// way, so there's nothing useful to report back.
pub async fn upload_record(State(state): State<AppState>, mut multipart: Multipart) -> StatusCode {
    let mut nonce = None;
    let mut raw_tar = None;
    let mut metadata = recording::UploadMetadata::default();

    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name().unwrap_or("") {
            "nonce" => nonce = field.text().await.ok(),
            "tar" => raw_tar = field.bytes().await.ok(),
            "bbb_origin" => metadata.bbb_origin = field.text().await.ok(),
            "bbb_origin_version" => metadata.bbb_origin_version = field.text().await.ok(),
            "bbb_origin_server_name" => metadata.bbb_origin_server_name = field.text().await.ok(),
            "participants" => {
                metadata.participants = field.text().await.ok().and_then(|v| v.parse().ok()).unwrap_or(0)
            }
            "gl_listed" => {
                metadata.gl_listed = field.text().await.ok().map(|v| v == "true").unwrap_or(false)
            }
            _ => {}
        }
    }

    let (Some(nonce), Some(raw_tar)) = (nonce, raw_tar) else {
        return StatusCode::BAD_REQUEST;
    };

    let record_set = match recording::accept_upload(
        &state.store,
        state.blob.as_ref(),
        &nonce,
        &raw_tar,
        metadata,
        state.path_hierarchy_width,
        state.path_hierarchy_depth,
    )
    .await
    {
        Ok(rs) => rs,
        Err(e) => {
            tracing::warn!("upload rejected: {e}");
            return StatusCode::BAD_REQUEST;
        }
    };

    let profiles = state
        .store
        .list_record_profiles_for_secret(record_set.secret_uuid)
        .unwrap_or_default();
    match recording::render_record_set(
        &state.store,
        state.renderer.as_ref(),
        record_set.uuid,
        &profiles,
        state.path_hierarchy_width,
        state.path_hierarchy_depth,
    )
    .await
    {
        Ok(_) => {
            if let Some(callback_url) = recording::recording_ready_callback_url(&record_set) {
                let http = state.http.clone();
                tokio::spawn(async move {
                    if let Err(e) = http.get(&callback_url).send().await {
                        tracing::warn!("recording-ready callback delivery failed: {e}");
                    }
                });
            }
        }
        Err(e) => tracing::warn!("render failed for record set {}: {e}", record_set.uuid),
    }

    StatusCode::NO_CONTENT
}

/// `GET /b3lb/ping` — liveness probe with a real DB round trip, so a wedged
/// SQLite file (not just a wedged process) takes the instance out of a
/// load balancer's rotation.
pub async fn ping(State(state): State<AppState>) -> Response {
    match state.store.ping() {
        Ok(()) => (StatusCode::OK, [("content-type", "text/plain")], "OK!").into_response(),
        Err(e) => {
            tracing::warn!("ping failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, [("content-type", "text/plain")], "Doh!").into_response()
        }
    }
}

/// `GET /b3lb/metrics` — Prometheus text exposition summed across every
/// tenant/secret in the deployment, plus per-node load gauges.
pub async fn domain_metrics(State(state): State<AppState>) -> Response {
    match aggregation::render_global_metrics_text(&state.store) {
        Ok(text) => ([("content-type", "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            tracing::error!("failed to render global metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /b3lb/metrics/:slug` — Prometheus text exposition summed across a
/// single tenant's secrets.
pub async fn domain_metrics_for_tenant(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let tenant = match state.store.get_tenant_by_slug(&slug.to_uppercase()) {
        Ok(t) => t,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    match aggregation::render_tenant_metrics_text(&state.store, tenant.uuid) {
        Ok(text) => ([("content-type", "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            tracing::error!("failed to render tenant metrics for {slug}: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub token: String,
}

/// `GET /b3lb/stats` — tenant-scoped, authenticated by the tenant's
/// `stats_token` rather than a Secret checksum (no existing Secret is
/// guaranteed to be in scope for a cross-sub_id rollup).
pub async fn stats(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(q): Query<StatsQuery>,
) -> Response {
    let tenant = match state.store.get_tenant_by_slug(&slug.to_uppercase()) {
        Ok(t) => t,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    if tenant.stats_token.to_string() != q.token {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match crate::stats::tenant_stats_json(&state.store, tenant.uuid) {
        Ok(snapshot) => axum::Json(snapshot).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn authorize_tenant(state: &AppState, slug: &str, token: &str) -> Option<b3lb_core::model::Tenant> {
    let tenant = state.store.get_tenant_by_slug(&slug.to_uppercase()).ok()?;
    if tenant.stats_token.to_string() == token {
        Some(tenant)
    } else {
        None
    }
}

/// `GET /b3lb/assets/:slug` — current asset metadata for a tenant.
pub async fn get_assets(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(q): Query<StatsQuery>,
) -> Response {
    let Some(tenant) = authorize_tenant(&state, &slug, &q.token) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match assets::get_assets(&state.store, tenant.uuid) {
        Ok(asset) => axum::Json(asset).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// `POST /b3lb/assets/:slug/slide` — multipart body with `token`, `filename`,
/// `mimetype`, and `data` parts.
pub async fn upload_slide(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    mut multipart: Multipart,
) -> StatusCode {
    let mut token = None;
    let mut filename = None;
    let mut mimetype = None;
    let mut data = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name().unwrap_or("") {
            "token" => token = field.text().await.ok(),
            "filename" => filename = field.text().await.ok(),
            "mimetype" => mimetype = field.text().await.ok(),
            "data" => data = field.bytes().await.ok(),
            _ => {}
        }
    }

    let (Some(token), Some(filename), Some(mimetype), Some(data)) = (token, filename, mimetype, data) else {
        return StatusCode::BAD_REQUEST;
    };
    let Some(tenant) = authorize_tenant(&state, &slug, &token) else {
        return StatusCode::UNAUTHORIZED;
    };

    match assets::set_slide(&state.store, state.blob.as_ref(), tenant.uuid, filename, mimetype, &data).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(B3lbError::ValidationError(_)) => StatusCode::PAYLOAD_TOO_LARGE,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn resolve_tenant_by_path_slug(state: &AppState, slug: &str) -> Option<b3lb_core::model::Tenant> {
    state.store.get_tenant_by_slug(&slug.to_uppercase()).ok()
}

/// `GET /b3lb/t/:slug/logo` — public; this is exactly the URL injected into
/// `create` as the `logo` parameter, so BBB nodes must be able to fetch it
/// unauthenticated.
pub async fn serve_logo(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let Some(tenant) = resolve_tenant_by_path_slug(&state, &slug) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let asset = match assets::get_assets(&state.store, tenant.uuid) {
        Ok(a) => a,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let (Some(key), Some(mimetype)) = (asset.logo_blob_key, asset.logo_mimetype) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.blob.get(&key).await {
        Ok(data) => ([("content-type", mimetype)], data).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `GET /b3lb/t/:slug/slide` — public, same rationale as [`serve_logo`]: it's
/// the `<document url=...>` reference injected for oversized slides.
pub async fn serve_slide(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let Some(tenant) = resolve_tenant_by_path_slug(&state, &slug) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let asset = match assets::get_assets(&state.store, tenant.uuid) {
        Ok(a) => a,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let (Some(key), Some(mimetype)) = (asset.slide_blob_key, asset.slide_mimetype) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.blob.get(&key).await {
        Ok(data) => ([("content-type", mimetype)], data).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `GET /b3lb/t/:slug/css` — public; referenced by `userdata-bbb_custom_style_url`.
pub async fn serve_custom_css(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let Some(tenant) = resolve_tenant_by_path_slug(&state, &slug) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let asset = match assets::get_assets(&state.store, tenant.uuid) {
        Ok(a) => a,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let Some(key) = asset.custom_css_blob_key else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.blob.get(&key).await {
        Ok(data) => ([("content-type", "text/css")], data).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_xml_maps_limit_failure_to_canned_body() {
        let response = error_xml(&B3lbError::LimitFailure("meeting limit reached".into()));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn error_xml_maps_auth_failure_to_401() {
        let response = error_xml(&B3lbError::AuthFailure("bad checksum".into()));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
