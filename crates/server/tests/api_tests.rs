//! Integration tests for HTTP API endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::TestServer;
use depot_core::ContentHash;
use serde_json::json;

fn sha256_hex(data: &[u8]) -> String {
    ContentHash::compute(data).to_hex()
}

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new();
    let (status, json) = server.json_request("GET", "/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "memory");
    assert_eq!(json["active_uploads"], 0);
}

#[tokio::test]
async fn test_full_upload_flow() {
    let server = TestServer::new();
    let upload_id = server.create_upload(10).await;

    // Second half first; order does not matter.
    let (status, ack) = server.put_chunk(&upload_id, 5, b"BBBBB", 10).await;
    assert_eq!(status, StatusCode::OK, "{ack}");
    assert_eq!(ack["range"], json!([5, 10]));
    assert_eq!(ack["completed"], false);

    let (status, ack) = server.put_chunk(&upload_id, 0, b"AAAAA", 10).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["bytes_received"], 10);
    assert_eq!(ack["completed"], true);

    let (status, session) = server
        .json_request("GET", &format!("/v1/uploads/{upload_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["state"], "open");
    assert_eq!(session["ranges"], json!([[0, 10]]));

    let digest = sha256_hex(b"AAAAABBBBB");
    let (status, artifact) = server
        .json_request(
            "POST",
            &format!("/v1/uploads/{upload_id}/commit"),
            Some(json!({ "sha256": digest })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{artifact}");
    assert_eq!(artifact["digest"], digest);
    assert_eq!(artifact["size"], 10);

    // The session is gone once committed.
    let (status, json) = server
        .json_request("GET", &format!("/v1/uploads/{upload_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "session_not_found");

    let (status, headers, body) = server.get_bytes(&format!("/v1/artifacts/{digest}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"AAAAABBBBB");
    assert_eq!(headers["content-length"], "10");
    assert_eq!(headers["etag"], format!("\"{digest}\"").as_str());
}

#[tokio::test]
async fn test_create_rejects_bad_sizes() {
    let server = TestServer::with_config(|config| config.uploads.max_upload_size = 100).await;

    let (status, json) = server
        .json_request("POST", "/v1/uploads", Some(json!({ "size": 0 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_size");

    let (status, json) = server
        .json_request("POST", "/v1/uploads", Some(json!({ "size": 101 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_size");

    let (status, json) = server
        .json_request("POST", "/v1/uploads", Some(json!({ "bytes": 5 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "bad_request");
}

#[tokio::test]
async fn test_unknown_and_malformed_upload_ids() {
    let server = TestServer::new();

    let (status, json) = server
        .json_request(
            "GET",
            "/v1/uploads/00000000-0000-4000-8000-000000000000",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "session_not_found");

    let (status, _) = server
        .json_request("GET", "/v1/uploads/not-a-uuid", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chunk_range_errors() {
    let server = TestServer::new();
    let upload_id = server.create_upload(10).await;

    // Past the declared size.
    let (status, json) = server.put_chunk(&upload_id, 8, b"CCCCC", 13).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_range");

    // Total disagrees with the session.
    let (status, json) = server.put_chunk(&upload_id, 0, b"AAAAA", 20).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_range");

    // Body shorter than the range.
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/v1/uploads/{upload_id}"))
        .header("Content-Range", "bytes 0-4/10")
        .body(Body::from("AAA"))
        .unwrap();
    let (status, json) = server.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_range");

    // No Content-Range at all.
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/v1/uploads/{upload_id}"))
        .body(Body::from("AAAAA"))
        .unwrap();
    let (status, json) = server.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "bad_request");
}

#[tokio::test]
async fn test_overlapping_chunk_conflicts() {
    let server = TestServer::new();
    let upload_id = server.create_upload(10).await;

    let (status, _) = server.put_chunk(&upload_id, 0, b"AAAAAA", 10).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = server.put_chunk(&upload_id, 5, b"BBBBB", 10).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "range_conflict");

    // An identical retransmission is acknowledged.
    let (status, ack) = server.put_chunk(&upload_id, 0, b"AAAAAA", 10).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["bytes_received"], 6);
}

#[tokio::test]
async fn test_chunk_hash_header_is_verified() {
    let server = TestServer::new();
    let upload_id = server.create_upload(5).await;

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/v1/uploads/{upload_id}"))
        .header("Content-Range", "bytes 0-4/5")
        .header("X-Chunk-Sha256", sha256_hex(b"other"))
        .body(Body::from("AAAAA"))
        .unwrap();
    let (status, json) = server.send(request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "chunk_integrity_error");

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/v1/uploads/{upload_id}"))
        .header("Content-Range", "bytes 0-4/5")
        .header("X-Chunk-Sha256", sha256_hex(b"AAAAA"))
        .body(Body::from("AAAAA"))
        .unwrap();
    let (status, ack) = server.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["completed"], true);
}

#[tokio::test]
async fn test_commit_errors_keep_session_open() {
    let server = TestServer::new();
    let upload_id = server.create_upload(10).await;
    let commit_uri = format!("/v1/uploads/{upload_id}/commit");
    let digest = sha256_hex(b"AAAAABBBBB");

    server.put_chunk(&upload_id, 0, b"AAAAA", 10).await;
    let (status, json) = server
        .json_request("POST", &commit_uri, Some(json!({ "sha256": digest })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "incomplete_upload");

    server.put_chunk(&upload_id, 5, b"BBBBB", 10).await;
    let (status, json) = server
        .json_request(
            "POST",
            &commit_uri,
            Some(json!({ "sha256": sha256_hex(b"something else") })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "digest_mismatch");

    let (status, json) = server
        .json_request("POST", &commit_uri, Some(json!({ "sha256": "xyz" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "bad_request");

    let (status, _) = server
        .json_request("POST", &commit_uri, Some(json!({ "sha256": digest })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_delete_upload() {
    let server = TestServer::new();
    let upload_id = server.create_upload(10).await;
    server.put_chunk(&upload_id, 0, b"AAAAA", 10).await;

    let uri = format!("/v1/uploads/{upload_id}");
    let (status, json) = server.json_request("DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(json, serde_json::Value::Null);

    let (status, _) = server.json_request("GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.put_chunk(&upload_id, 5, b"BBBBB", 10).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(server.state.storage.list("uploads/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_artifact() {
    let server = TestServer::new();

    let (status, _, _) = server
        .get_bytes(&format!("/v1/artifacts/{}", sha256_hex(b"never stored")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = server.get_bytes("/v1/artifacts/not-hex").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_filesystem_backed_upload() {
    let server = TestServer::with_config(|_| {}).await;
    let data = vec![7u8; 3000];
    let upload_id = server.create_upload(3000).await;

    for (i, part) in data.chunks(1000).enumerate() {
        let (status, _) = server
            .put_chunk(&upload_id, (i * 1000) as u64, part, 3000)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let digest = sha256_hex(&data);
    let (status, _) = server
        .json_request(
            "POST",
            &format!("/v1/uploads/{upload_id}/commit"),
            Some(json!({ "sha256": digest })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = server.get_bytes(&format!("/v1/artifacts/{digest}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, data);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = TestServer::new();
    server.create_upload(10).await;

    let (status, _, body) = server.get_bytes("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("depot_upload_sessions_created_total"));

    let disabled =
        TestServer::with_config(|config| config.server.metrics_enabled = false).await;
    let (status, _, _) = disabled.get_bytes("/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_chunk_body_is_invalid_range() {
    let server = TestServer::with_config(|config| config.uploads.max_chunk_size = 16).await;
    let upload_id = server.create_upload(5000).await;

    // Range and body both past the chunk cap and the read buffer.
    let (status, json) = server
        .put_chunk(&upload_id, 0, &vec![1u8; 5000], 5000)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_range");

    // A small range carrying a much larger body.
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/v1/uploads/{upload_id}"))
        .header("Content-Range", "bytes 0-4/5000")
        .body(Body::from(vec![2u8; 4096]))
        .unwrap();
    let (status, json) = server.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_range");

    let (_, session) = server
        .json_request("GET", &format!("/v1/uploads/{upload_id}"), None)
        .await;
    assert_eq!(session["bytes_received"], 0);
}

#[tokio::test]
async fn test_status_failures_are_counted() {
    let server = TestServer::new();
    let counter = depot_server::metrics::UPLOAD_ERRORS.with_label_values(&["session_not_found"]);
    let before = counter.get();

    let missing = "00000000-0000-4000-8000-000000000001";
    let (status, _) = server
        .json_request("GET", &format!("/v1/uploads/{missing}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.put_chunk(missing, 0, b"AAAAA", 10).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(counter.get() >= before + 2);
}
