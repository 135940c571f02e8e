//! End-to-end integration tests for Filebay.
//!
//! These tests drive a real TCP server over a temporary root directory
//! with the real client:
//! - Listing with search and recursion
//! - Chunked downloads and uploads
//! - Delete, move, and copy
//! - Error replies surfaced through the client

use std::path::Path;
use std::time::Duration;

use daemon::client::{Client, ClientError};
use daemon::files::Sandbox;
use daemon::router::Router;
use daemon::server::Server;
use protocol::messages::{ErrorCode, FILE_FOLDER_KIND};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Patterned payload large enough to span several default-size chunks.
fn chunked_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Populate the standard test tree under `root`.
///
/// ```text
/// root/
///   notes.txt
///   docs/guide.txt
///   photos/beach.png
///   photos/trips/
/// ```
fn populate_root(root: &Path) {
    std::fs::create_dir_all(root.join("docs")).unwrap();
    std::fs::create_dir_all(root.join("photos/trips")).unwrap();
    std::fs::write(root.join("notes.txt"), "meeting notes\n").unwrap();
    std::fs::write(root.join("docs/guide.txt"), "how to\n").unwrap();
    std::fs::write(root.join("photos/beach.png"), chunked_payload(2048)).unwrap();
}

/// Start a daemon over a fresh root and connect the real client to it.
async fn start_daemon(populate: bool) -> (Client, TempDir, CancellationToken) {
    let root = TempDir::new().unwrap();
    if populate {
        populate_root(root.path());
    }

    let sandbox = Sandbox::new(root.path()).unwrap();
    let router = Router::new(sandbox, 1024 * 1024, 64 * 1024);
    let server = Server::bind("127.0.0.1:0", router).await.unwrap();
    let addr = server.local_addr().unwrap();

    let token = CancellationToken::new();
    let run_token = token.clone();
    tokio::spawn(async move {
        server.run(run_token).await;
    });

    let client = Client::connect(&addr.to_string()).await.unwrap();
    (client, root, token)
}

/// Unwrap a daemon-side error reply and return its code.
fn daemon_error_code(err: ClientError) -> ErrorCode {
    match err {
        ClientError::Daemon(msg) => msg.code,
        other => panic!("expected a daemon error, got: {:?}", other),
    }
}

// =============================================================================
// Connection Tests
// =============================================================================

#[tokio::test]
async fn test_ping() {
    let (mut client, _root, _token) = start_daemon(true).await;

    assert!(client.ping().await.unwrap());
}

// =============================================================================
// Listing Tests
// =============================================================================

#[tokio::test]
async fn test_list_root_counts_and_order() {
    let (mut client, _root, _token) = start_daemon(true).await;

    let response = client.list("", None, false).await.unwrap();

    assert_eq!(response.file_count, 1);
    assert_eq!(response.directory_count, 2);
    assert_eq!(response.entries.len(), 3);

    // Directories come first
    assert_eq!(response.entries[0].name, "docs");
    assert_eq!(response.entries[0].kind, FILE_FOLDER_KIND);
    assert!(response.entries[0].is_directory());
    assert_eq!(response.entries[1].name, "photos");
    assert_eq!(response.entries[2].name, "notes.txt");
    assert_eq!(response.entries[2].kind, "Text document");
    assert_eq!(response.entries[2].size, Some("meeting notes\n".len() as u64));
}

#[tokio::test]
async fn test_list_recursive() {
    let (mut client, _root, _token) = start_daemon(true).await;

    let response = client.list("", None, true).await.unwrap();

    assert_eq!(response.file_count, 3);
    assert_eq!(response.directory_count, 3);
}

#[tokio::test]
async fn test_list_search_filters_names() {
    let (mut client, _root, _token) = start_daemon(true).await;

    let response = client
        .list("", Some("guide".to_string()), true)
        .await
        .unwrap();

    assert_eq!(response.file_count, 1);
    assert_eq!(response.directory_count, 0);
    assert_eq!(response.entries[0].name, "guide.txt");
}

#[tokio::test]
async fn test_list_missing_directory() {
    let (mut client, _root, _token) = start_daemon(true).await;

    let err = client.list("no-such-dir", None, false).await.unwrap_err();
    assert_eq!(daemon_error_code(err), ErrorCode::InvalidPath);
}

// =============================================================================
// Download Tests
// =============================================================================

#[tokio::test]
async fn test_download_file() {
    let (mut client, _root, _token) = start_daemon(true).await;
    let local_dir = TempDir::new().unwrap();
    let dest = local_dir.path().join("beach.png");

    let bytes = client.download("photos/beach.png", &dest).await.unwrap();

    assert_eq!(bytes, 2048);
    assert_eq!(std::fs::read(&dest).unwrap(), chunked_payload(2048));
}

#[tokio::test]
async fn test_download_spans_chunks() {
    let (mut client, root, _token) = start_daemon(true).await;
    let payload = chunked_payload(200 * 1024);
    std::fs::write(root.path().join("big.bin"), &payload).unwrap();

    let local_dir = TempDir::new().unwrap();
    let dest = local_dir.path().join("big.bin");
    let bytes = client.download("big.bin", &dest).await.unwrap();

    assert_eq!(bytes, payload.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), payload);
}

#[tokio::test]
async fn test_download_missing_file() {
    let (mut client, _root, _token) = start_daemon(true).await;
    let local_dir = TempDir::new().unwrap();

    let err = client
        .download("ghost.bin", &local_dir.path().join("ghost.bin"))
        .await
        .unwrap_err();
    assert_eq!(daemon_error_code(err), ErrorCode::NotFound);
}

// =============================================================================
// Upload Tests
// =============================================================================

#[tokio::test]
async fn test_upload_then_list_shows_file() {
    let (mut client, root, _token) = start_daemon(false).await;
    let local_dir = TempDir::new().unwrap();
    let report = local_dir.path().join("report.csv");
    std::fs::write(&report, "a,b\n1,2\n").unwrap();

    let (path, size) = client.upload(&report, "").await.unwrap();

    assert!(path.ends_with("report.csv"));
    assert_eq!(size, 8);
    assert_eq!(
        std::fs::read_to_string(root.path().join("report.csv")).unwrap(),
        "a,b\n1,2\n"
    );

    let response = client.list("", None, false).await.unwrap();
    assert_eq!(response.file_count, 1);
    assert_eq!(response.entries[0].name, "report.csv");
}

#[tokio::test]
async fn test_upload_spans_chunks() {
    let (mut client, root, _token) = start_daemon(true).await;
    let payload = chunked_payload(150 * 1024);
    let local_dir = TempDir::new().unwrap();
    let local = local_dir.path().join("payload.bin");
    std::fs::write(&local, &payload).unwrap();

    let (_, size) = client.upload(&local, "docs").await.unwrap();

    assert_eq!(size, payload.len() as u64);
    assert_eq!(
        std::fs::read(root.path().join("docs/payload.bin")).unwrap(),
        payload
    );
}

#[tokio::test]
async fn test_upload_overwrites_existing() {
    let (mut client, root, _token) = start_daemon(true).await;
    let local_dir = TempDir::new().unwrap();
    let local = local_dir.path().join("notes.txt");
    std::fs::write(&local, "fresh notes\n").unwrap();

    client.upload(&local, "").await.unwrap();

    assert_eq!(
        std::fs::read_to_string(root.path().join("notes.txt")).unwrap(),
        "fresh notes\n"
    );
}

// =============================================================================
// Tree Operation Tests
// =============================================================================

#[tokio::test]
async fn test_delete_file() {
    let (mut client, root, _token) = start_daemon(true).await;

    client.delete("notes.txt").await.unwrap();

    assert!(!root.path().join("notes.txt").exists());
    let response = client.list("", None, false).await.unwrap();
    assert_eq!(response.file_count, 0);
}

#[tokio::test]
async fn test_delete_directory_tree() {
    let (mut client, root, _token) = start_daemon(true).await;

    client.delete("photos").await.unwrap();

    assert!(!root.path().join("photos").exists());
}

#[tokio::test]
async fn test_delete_missing_is_not_found() {
    let (mut client, _root, _token) = start_daemon(true).await;

    let err = client.delete("ghost.txt").await.unwrap_err();
    assert_eq!(daemon_error_code(err), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_move_into_directory() {
    let (mut client, root, _token) = start_daemon(true).await;

    let dest = client.move_entry("notes.txt", "docs").await.unwrap();

    assert!(dest.ends_with("docs/notes.txt"));
    assert!(!root.path().join("notes.txt").exists());
    assert_eq!(
        std::fs::read_to_string(root.path().join("docs/notes.txt")).unwrap(),
        "meeting notes\n"
    );
}

#[tokio::test]
async fn test_copy_directory_tree() {
    let (mut client, root, _token) = start_daemon(true).await;

    client.copy_entry("photos", "backup").await.unwrap();

    // Copy preserves structure and leaves the source intact
    assert!(root.path().join("backup/trips").is_dir());
    assert_eq!(
        std::fs::read(root.path().join("backup/beach.png")).unwrap(),
        chunked_payload(2048)
    );
    assert!(root.path().join("photos/beach.png").exists());
}

#[tokio::test]
async fn test_move_directory_onto_file_is_conflict() {
    let (mut client, root, _token) = start_daemon(true).await;

    let err = client.move_entry("photos", "notes.txt").await.unwrap_err();

    assert_eq!(daemon_error_code(err), ErrorCode::Conflict);
    // Both sides untouched
    assert!(root.path().join("photos").is_dir());
    assert_eq!(
        std::fs::read_to_string(root.path().join("notes.txt")).unwrap(),
        "meeting notes\n"
    );
}

#[tokio::test]
async fn test_operations_cannot_escape_root() {
    // The sandbox root sits one level down, with a real file next to it
    // that `..` traversal would reach.
    let outer = TempDir::new().unwrap();
    std::fs::create_dir(outer.path().join("root")).unwrap();
    std::fs::write(outer.path().join("outside.txt"), "keep out").unwrap();

    let sandbox = Sandbox::new(outer.path().join("root")).unwrap();
    let router = Router::new(sandbox, 1024 * 1024, 64 * 1024);
    let server = Server::bind("127.0.0.1:0", router).await.unwrap();
    let addr = server.local_addr().unwrap();
    let token = CancellationToken::new();
    let run_token = token.clone();
    tokio::spawn(async move {
        server.run(run_token).await;
    });
    let mut client = Client::connect(&addr.to_string()).await.unwrap();

    let err = client.delete("../outside.txt").await.unwrap_err();

    assert_eq!(daemon_error_code(err), ErrorCode::InvalidPath);
    assert!(outer.path().join("outside.txt").exists());
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let (mut client, _root, token) = start_daemon(true).await;

    assert!(client.ping().await.unwrap());

    token.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(client.ping().await.is_err());
}
