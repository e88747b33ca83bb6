//! Integration tests for the b3lb HTTP dispatcher.
//!
//! Builds the real `Router` from `handlers` against a temp-file `Store`,
//! seeding a tenant/secret/cluster chain the same way `store.rs`'s own unit
//! tests do, then drives requests through it with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use b3lb_core::model::{Cluster, ClusterGroup, Secret, ShaAlgorithm, Tenant};
use b3lb_core::signing::{encode_query_string, sign_outbound};
use b3lb_storage::{LocalBlobStore, NullRenderer, Store};
use rusqlite::params;
use tower::ServiceExt;
use uuid::Uuid;

use b3lb_api::handlers::{self, AppState};

fn seed(store: &Store) -> (Tenant, Secret) {
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
    drop(conn);

    let cluster = Cluster {
        uuid: Uuid::new_v4(),
        name: "cluster-a".into(),
        hash_algorithm: ShaAlgorithm::Sha256,
        ..Cluster::default()
    };
    store.insert_cluster(&cluster).unwrap();

    let conn = store.get_connection().unwrap();
    conn.execute(
        "INSERT INTO cluster_group_relations (uuid, cluster_group_uuid, cluster_uuid) VALUES (?1, ?2, ?3)",
        params![Uuid::new_v4().to_string(), group.uuid.to_string(), cluster.uuid.to_string()],
    )
    .unwrap();
    drop(conn);

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
        secret: "s3cr3t".into(),
        secret2: String::new(),
        attendee_limit: 0,
        meeting_limit: 0,
        recording_enabled: true,
        records_hold_time: 14,
    };
    store.insert_secret(&secret).unwrap();

    (tenant, secret)
}

fn test_app() -> (Router, Tenant, Secret, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path().join("test.sqlite3")).unwrap();
    let (tenant, secret) = seed(&store);

    let blob: Arc<dyn b3lb_storage::BlobStore> = Arc::new(LocalBlobStore::new(dir.path().join("blobs")));
    let renderer: Arc<dyn b3lb_storage::Renderer> = Arc::new(NullRenderer);
    let state = AppState {
        store,
        blob,
        renderer,
        http: reqwest::Client::new(),
        api_base_domain: "bbbconf.test".into(),
        path_hierarchy_width: 2,
        path_hierarchy_depth: 2,
    };

    let app = Router::new()
        .route(
            "/bigbluebutton/api/:endpoint",
            get(handlers::bbb_api).post(handlers::bbb_api),
        )
        .route("/health", get(|| async { "ok" }))
        .with_state(state);

    (app, tenant, secret, dir)
}

fn signed_url(tenant: &Tenant, endpoint: &str, params: &[(&str, &str)], secret: &str) -> String {
    let owned: Vec<(String, String)> = params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let query = encode_query_string(&owned);
    let checksum = sign_outbound(endpoint, &query, secret, ShaAlgorithm::Sha256);
    format!(
        "http://{}.bbbconf.test/bigbluebutton/api/{}?{}&checksum={}",
        tenant.slug.to_lowercase(),
        endpoint,
        query,
        checksum
    )
}

#[tokio::test]
async fn health_check_responds_ok() {
    let (app, ..) = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_endpoint_is_rejected() {
    let (app, tenant, secret, _dir) = test_app();
    let url = signed_url(&tenant, "notARealEndpoint", &[], &secret.secret);
    let host = format!("{}.bbbconf.test", tenant.slug.to_lowercase());
    let response = app
        .oneshot(
            Request::builder()
                .uri(url.replace(&format!("http://{host}"), ""))
                .header("host", host)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn is_meeting_running_with_bad_checksum_returns_auth_failure() {
    let (app, tenant, _secret, _dir) = test_app();
    let host = format!("{}.bbbconf.test", tenant.slug.to_lowercase());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/bigbluebutton/api/isMeetingRunning?meetingID=foo&checksum=deadbeef")
                .header("host", host)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn is_meeting_running_for_unknown_meeting_is_false() {
    let (app, tenant, secret, _dir) = test_app();
    let url = signed_url(&tenant, "isMeetingRunning", &[("meetingID", "no-such-meeting")], &secret.secret);
    let host = format!("{}.bbbconf.test", tenant.slug.to_lowercase());
    let path_and_query = url.replace(&format!("http://{host}"), "");

    let response = app
        .oneshot(
            Request::builder()
                .uri(path_and_query)
                .header("host", host)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("<running>false</running>"));
}
