use std::fs;
use std::time::Duration;

use modforge_engine::{
    ApiErrorKind, ApiSettings, ModApi, ProcessRequest, RemoteStatus, ReqwestModApi, UploadSource,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(server: &MockServer) -> ReqwestModApi {
    ReqwestModApi::new(ApiSettings {
        base_url: format!("{}/api/v1", server.uri()),
        ..ApiSettings::default()
    })
    .unwrap()
}

fn mod_on_disk(temp: &TempDir, name: &str) -> UploadSource {
    let path = temp.path().join(name);
    fs::write(&path, b"PK\x03\x04 fake jar").unwrap();
    UploadSource {
        path,
        file_name: name.to_string(),
    }
}

#[tokio::test]
async fn upload_sends_multipart_and_reads_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/mods/upload"))
        .and(body_string_contains("name=\"mod_file\""))
        .and(body_string_contains("filename=\"cool.jar\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "job_id": "J1",
            "status": "pending",
            "mod_type": "minecraft",
            "message": "File uploaded successfully",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let receipt = api_for(&server)
        .upload(&mod_on_disk(&temp, "cool.jar"))
        .await
        .expect("upload ok");

    assert_eq!(receipt.job_id, "J1");
    assert_eq!(receipt.status, RemoteStatus::Pending);
    assert_eq!(receipt.mod_type.as_deref(), Some("minecraft"));
}

#[tokio::test]
async fn upload_rejection_carries_server_text_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/mods/upload"))
        .respond_with(
            ResponseTemplate::new(413).set_body_json(json!({ "error": "file too large" })),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let err = api_for(&server)
        .upload(&mod_on_disk(&temp, "huge.jar"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ApiErrorKind::ServerRejected(413));
    assert_eq!(err.message, "file too large");
}

#[tokio::test]
async fn rejection_without_payload_uses_generic_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/mods/jobs/J1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = api_for(&server).job_status("J1").await.unwrap_err();

    assert_eq!(err.kind, ApiErrorKind::ServerRejected(502));
    assert_eq!(err.message, "Status check failed (http 502)");
}

#[tokio::test]
async fn unreadable_success_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/mods/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let err = api_for(&server)
        .upload(&mod_on_disk(&temp, "mod.zip"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ApiErrorKind::Malformed);
}

#[tokio::test]
async fn missing_local_file_fails_before_sending() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let source = UploadSource {
        path: temp.path().join("gone.jar"),
        file_name: "gone.jar".to_string(),
    };

    let err = api_for(&server).upload(&source).await.unwrap_err();

    assert_eq!(err.kind, ApiErrorKind::Transport);
    assert!(err.message.starts_with("Upload failed"));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn presets_are_listed_from_trailing_slash_route() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/presets/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "presets": [
                {
                    "id": "minecraft_balance",
                    "name": "Balance",
                    "description": "Rebalance items",
                    "credit_cost": 2,
                    "game_type": "minecraft"
                },
                { "id": "bare", "name": "Bare" }
            ]
        })))
        .mount(&server)
        .await;

    let presets = api_for(&server).presets().await.unwrap();

    assert_eq!(presets.len(), 2);
    assert_eq!(presets[0].id, "minecraft_balance");
    assert_eq!(presets[0].credit_cost, 2);
    assert_eq!(presets[1].description, "");
    assert_eq!(presets[1].game_type, None);
}

#[tokio::test]
async fn processing_request_posts_preset_and_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/mods/jobs/J1/process"))
        .and(body_json(json!({
            "preset_id": "minecraft_balance",
            "prompt": "make it fair",
            "model_config": "default",
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "Processing started" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = ProcessRequest {
        preset_id: "minecraft_balance".to_string(),
        prompt: "make it fair".to_string(),
        model_config: "default".to_string(),
    };
    api_for(&server)
        .request_processing("J1", &request)
        .await
        .expect("accepted");
}

#[tokio::test]
async fn status_report_carries_result_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/mods/jobs/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "J1",
            "status": "completed",
            "processed_url": "https://cdn.example/J1.jar",
            "tokens_used": 1200,
            "credits_used": 2
        })))
        .mount(&server)
        .await;

    let report = api_for(&server).job_status("J1").await.unwrap();

    assert_eq!(report.status, RemoteStatus::Completed);
    assert_eq!(report.processed_url.as_deref(), Some("https://cdn.example/J1.jar"));
    assert_eq!(report.tokens_used, Some(1200));
    assert_eq!(report.credits_used, Some(2));
}

#[tokio::test]
async fn slow_status_check_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/mods/jobs/J1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_json(json!({ "status": "processing" })),
        )
        .mount(&server)
        .await;

    let api = ReqwestModApi::new(ApiSettings {
        base_url: format!("{}/api/v1", server.uri()),
        request_timeout: Duration::from_millis(50),
        ..ApiSettings::default()
    })
    .unwrap();

    let err = api.job_status("J1").await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Timeout);
    assert!(err.is_transport());
}

#[tokio::test]
async fn download_location_is_resolved_each_time() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/mods/jobs/J1/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "download_url": "https://cdn.example/J1.jar?sig=abc",
            "expires_in": 3600
        })))
        .expect(2)
        .mount(&server)
        .await;

    let api = api_for(&server);
    for _ in 0..2 {
        let location = api.download_location("J1").await.unwrap();
        assert_eq!(location, "https://cdn.example/J1.jar?sig=abc");
    }
}

#[tokio::test]
async fn download_without_url_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/mods/jobs/J1/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = api_for(&server).download_location("J1").await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Malformed);
}

#[tokio::test]
async fn history_pages_through_jobs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/mods/jobs"))
        .and(query_param("page", "2"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobs": [
                {
                    "id": "J7",
                    "status": "completed",
                    "mod_type": "minecraft",
                    "original_filename": "cool.jar",
                    "original_file_size": 2048,
                    "credits_used": 2,
                    "created_at": "2026-01-02T03:04:05Z"
                },
                { "id": "J8", "status": "archived" }
            ],
            "page": 2,
            "limit": 20
        })))
        .mount(&server)
        .await;

    let page = api_for(&server).job_history(2, 20, None).await.unwrap();

    assert_eq!(page.page, 2);
    assert_eq!(page.jobs.len(), 2);
    assert_eq!(page.jobs[0].original_filename.as_deref(), Some("cool.jar"));
    assert_eq!(page.jobs[1].status, RemoteStatus::Unknown);
}

#[tokio::test]
async fn history_can_be_filtered_by_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/mods/jobs"))
        .and(query_param("status", "completed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobs": [{ "id": "J7", "status": "completed" }],
            "page": 1,
            "limit": 10
        })))
        .mount(&server)
        .await;

    let page = api_for(&server)
        .job_history(1, 10, Some(RemoteStatus::Completed))
        .await
        .unwrap();

    assert_eq!(page.jobs.len(), 1);
    assert_eq!(page.jobs[0].status, RemoteStatus::Completed);
}

#[tokio::test]
async fn bearer_credential_can_be_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/presets/"))
        .and(header("authorization", "Bearer first"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "presets": [] })))
        .mount(&server)
        .await;

    let api = ReqwestModApi::new(ApiSettings {
        base_url: format!("{}/api/v1", server.uri()),
        bearer_token: Some("first".to_string()),
        ..ApiSettings::default()
    })
    .unwrap();
    assert!(api.presets().await.unwrap().is_empty());

    api.set_credential(Some("second".to_string()));
    let err = api.presets().await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::ServerRejected(404));
}

#[test]
fn base_url_must_be_hierarchical() {
    for bad in ["not a url", "mailto:ops@example.com"] {
        let err = ReqwestModApi::new(ApiSettings {
            base_url: bad.to_string(),
            ..ApiSettings::default()
        })
        .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::InvalidUrl, "{bad}");
    }
}
