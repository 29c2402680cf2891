//! End-to-end sync scenarios against a real Postgres database, covering the
//! Sync Engine's invariants: clean create, conflict detection, idempotent
//! re-declare, delete-then-recreate version continuity, skipped pending
//! rows, and quota enforcement.

mod common;

use axum::http::StatusCode;
use common::{create_vault, register, request_json_auth, unique_email, upload_bytes};

async fn push_one(
    app: &axum::Router,
    token: &str,
    vault_id: uuid::Uuid,
    change: serde_json::Value,
) -> serde_json::Value {
    let body = serde_json::json!({ "changes": [change] });
    let (status, json) =
        request_json_auth(app, "POST", &format!("/api/v1/vaults/{vault_id}/sync/push"), token, Some(body)).await;
    assert_eq!(status, StatusCode::OK, "push failed: {json:?}");
    json["results"][0].clone()
}

fn create_change(path: &str, hash: &str, size: i64) -> serde_json::Value {
    serde_json::json!({
        "encrypted_path": path,
        "operation": "create",
        "content_hash": hash,
        "size": size,
        "modified_at": 1_700_000_000_000i64,
    })
}

#[tokio::test]
async fn clean_create_is_accepted_and_shows_up_on_pull() {
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;
    let vault_id = create_vault(&app, &session.access_token, "vault-1").await;

    let outcome = push_one(&app, &session.access_token, vault_id, create_change("notes/a.enc", "hash-a", 128)).await;
    assert_eq!(outcome["status"], "accepted");
    let file_id = outcome["file_id"].as_str().unwrap().to_string();
    assert_eq!(outcome["new_version"], 1);

    upload_bytes(
        &app,
        &session.access_token,
        &format!("/api/v1/vaults/{vault_id}/files/{file_id}/upload"),
        b"ciphertext-bytes".to_vec(),
    )
    .await;

    let pull_body = serde_json::json!({ "cursor": null, "limit": 100 });
    let (status, pull) =
        request_json_auth(&app, "POST", &format!("/api/v1/vaults/{vault_id}/sync/pull"), &session.access_token, Some(pull_body))
            .await;
    assert_eq!(status, StatusCode::OK);
    let changes = pull["changes"].as_array().unwrap();
    assert!(changes
        .iter()
        .any(|c| c["file"]["file_id"].as_str() == Some(file_id.as_str()) && c["operation"].as_str() == Some("create")));
}

#[tokio::test]
async fn pending_upload_without_content_is_skipped_on_pull_but_cursor_advances() {
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;
    let vault_id = create_vault(&app, &session.access_token, "vault-pending").await;

    // Pushed but never uploaded: the row exists, the blob doesn't.
    let outcome = push_one(&app, &session.access_token, vault_id, create_change("notes/pending.enc", "hash-p", 64)).await;
    let pending_id = outcome["file_id"].as_str().unwrap().to_string();

    // A second, fully-uploaded file so the page has something to return.
    let outcome2 = push_one(&app, &session.access_token, vault_id, create_change("notes/ready.enc", "hash-r", 32)).await;
    let ready_id = outcome2["file_id"].as_str().unwrap().to_string();
    upload_bytes(
        &app,
        &session.access_token,
        &format!("/api/v1/vaults/{vault_id}/files/{ready_id}/upload"),
        b"ready-bytes".to_vec(),
    )
    .await;

    let pull_body = serde_json::json!({ "cursor": null, "limit": 100 });
    let (status, pull) =
        request_json_auth(&app, "POST", &format!("/api/v1/vaults/{vault_id}/sync/pull"), &session.access_token, Some(pull_body))
            .await;
    assert_eq!(status, StatusCode::OK);
    let changes = pull["changes"].as_array().unwrap();
    assert!(
        !changes.iter().any(|c| c["file"]["file_id"].as_str() == Some(pending_id.as_str())),
        "pending upload must not be surfaced"
    );
    assert!(changes.iter().any(|c| c["file"]["file_id"].as_str() == Some(ready_id.as_str())));
    assert!(pull["next_cursor"].is_string(), "cursor must advance past the skipped row too");
}

#[tokio::test]
async fn stale_base_version_with_different_content_is_a_conflict() {
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;
    let vault_id = create_vault(&app, &session.access_token, "vault-conflict").await;

    let created = push_one(&app, &session.access_token, vault_id, create_change("doc.enc", "hash-1", 10)).await;
    assert_eq!(created["status"], "accepted");

    let stale_update = serde_json::json!({
        "encrypted_path": "doc.enc",
        "operation": "update",
        "content_hash": "hash-2-different",
        "size": 20,
        "modified_at": 1_700_000_001_000i64,
        "base_version": 0,
    });
    let outcome = push_one(&app, &session.access_token, vault_id, stale_update).await;
    assert_eq!(outcome["status"], "conflict");
}

#[tokio::test]
async fn resubmitting_the_same_content_is_idempotent() {
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;
    let vault_id = create_vault(&app, &session.access_token, "vault-idempotent").await;

    let change = create_change("doc.enc", "hash-same", 10);
    let first = push_one(&app, &session.access_token, vault_id, change.clone()).await;
    assert_eq!(first["status"], "accepted");
    let file_id = first["file_id"].as_str().unwrap().to_string();

    upload_bytes(
        &app,
        &session.access_token,
        &format!("/api/v1/vaults/{vault_id}/files/{file_id}/upload"),
        b"same-bytes".to_vec(),
    )
    .await;

    let mut resubmit = change;
    resubmit["operation"] = serde_json::json!("update");
    resubmit["base_version"] = serde_json::json!(1);
    let second = push_one(&app, &session.access_token, vault_id, resubmit).await;

    assert_eq!(second["status"], "accepted");
    assert_eq!(second["new_version"], 1, "resubmitting identical content must not bump the version");
    assert!(second["upload_url"].is_null(), "already-uploaded identical content needs no new upload");
}

#[tokio::test]
async fn delete_then_recreate_continues_version_numbering_on_the_same_row() {
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;
    let vault_id = create_vault(&app, &session.access_token, "vault-tombstone").await;

    let created = push_one(&app, &session.access_token, vault_id, create_change("doc.enc", "hash-1", 10)).await;
    let original_id = created["file_id"].as_str().unwrap().to_string();
    assert_eq!(created["new_version"], 1);

    let delete = serde_json::json!({ "encrypted_path": "doc.enc", "operation": "delete" });
    let deleted = push_one(&app, &session.access_token, vault_id, delete).await;
    assert_eq!(deleted["status"], "accepted");
    assert_eq!(deleted["new_version"], 2);

    let recreated = push_one(&app, &session.access_token, vault_id, create_change("doc.enc", "hash-2", 20)).await;
    assert_eq!(recreated["status"], "accepted");
    assert_eq!(
        recreated["file_id"].as_str(),
        Some(original_id.as_str()),
        "recreate on a tombstoned path must reuse the row id"
    );
    assert_eq!(recreated["new_version"], 3, "version numbering continues rather than resetting to 1");
}

#[tokio::test]
async fn push_over_quota_is_reported_as_an_error_verdict_not_an_http_failure() {
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;
    let vault_id = create_vault(&app, &session.access_token, "vault-quota").await;

    // The free tier's quota is 100 MiB; one change that alone exceeds it
    // must still ride in a 200 response as a per-change error verdict.
    let huge = create_change("huge.enc", "hash-huge", 200 * 1024 * 1024);
    let outcome = push_one(&app, &session.access_token, vault_id, huge).await;
    assert_eq!(outcome["status"], "error");
}

#[tokio::test]
async fn confirm_reports_missing_blobs_as_failed() {
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;
    let vault_id = create_vault(&app, &session.access_token, "vault-confirm").await;

    let created = push_one(&app, &session.access_token, vault_id, create_change("doc.enc", "hash-1", 10)).await;
    let file_id = created["file_id"].as_str().unwrap().to_string();

    let body = serde_json::json!({ "file_ids": [file_id] });
    let (status, confirm) = request_json_auth(
        &app,
        "POST",
        &format!("/api/v1/vaults/{vault_id}/sync/confirm"),
        &session.access_token,
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(confirm["failed"].as_array().unwrap().iter().any(|v| v == &file_id));
    assert!(confirm["confirmed"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn status_reflects_live_file_count_and_size() {
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;
    let vault_id = create_vault(&app, &session.access_token, "vault-status").await;

    push_one(&app, &session.access_token, vault_id, create_change("a.enc", "hash-a", 100)).await;
    push_one(&app, &session.access_token, vault_id, create_change("b.enc", "hash-b", 50)).await;

    let (status, body) =
        request_json_auth(&app, "GET", &format!("/api/v1/vaults/{vault_id}/sync/status"), &session.access_token, None)
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file_count"], 2);
    assert_eq!(body["total_size_bytes"], 150);
}

#[tokio::test]
async fn another_users_vault_is_not_found_rather_than_forbidden() {
    let app = common::test_router().await;
    let owner = register(&app, &unique_email()).await;
    let intruder = register(&app, &unique_email()).await;
    let vault_id = create_vault(&app, &owner.access_token, "owners-vault").await;

    let (status, _) =
        request_json_auth(&app, "GET", &format!("/api/v1/vaults/{vault_id}"), &intruder.access_token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
