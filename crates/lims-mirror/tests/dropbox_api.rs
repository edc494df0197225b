use lims_core::{DropboxCredentials, LimsError, RemoteStore};
use lims_mirror::DropboxMirror;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use warp::http::StatusCode;
use warp::Filter;

#[derive(Debug, Default)]
struct FakeDropbox {
    token_requests: AtomicUsize,
    uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
}

fn credentials(refresh_token: &str) -> DropboxCredentials {
    DropboxCredentials {
        app_key: "key".into(),
        app_secret: "secret".into(),
        refresh_token: refresh_token.into(),
    }
}

fn spawn_fake(state: Arc<FakeDropbox>) -> SocketAddr {
    let token_state = state.clone();
    let token = warp::post()
        .and(warp::path!("oauth2" / "token"))
        .and(warp::body::form())
        .map(move |form: HashMap<String, String>| {
            token_state.token_requests.fetch_add(1, Ordering::SeqCst);
            let ok = form.get("grant_type").map(String::as_str) == Some("refresh_token")
                && form.get("refresh_token").map(String::as_str) == Some("good-refresh")
                && form.get("client_id").map(String::as_str) == Some("key");
            if ok {
                warp::reply::with_status(
                    warp::reply::json(&serde_json::json!({
                        "access_token": "access-1",
                        "token_type": "bearer",
                        "expires_in": 14400
                    })),
                    StatusCode::OK,
                )
            } else {
                warp::reply::with_status(
                    warp::reply::json(&serde_json::json!({ "error": "invalid_grant" })),
                    StatusCode::BAD_REQUEST,
                )
            }
        });

    let upload_state = state;
    let upload = warp::post()
        .and(warp::path!("2" / "files" / "upload"))
        .and(warp::header::<String>("authorization"))
        .and(warp::header::<String>("dropbox-api-arg"))
        .and(warp::body::bytes())
        .map(move |auth: String, arg: String, body: warp::hyper::body::Bytes| {
            if auth != "Bearer access-1" {
                return warp::reply::with_status("bad token".to_string(), StatusCode::UNAUTHORIZED);
            }
            if arg.contains("rechazar") {
                return warp::reply::with_status("path/conflict".to_string(), StatusCode::CONFLICT);
            }
            upload_state
                .uploads
                .lock()
                .unwrap()
                .push((auth, arg, body.to_vec()));
            warp::reply::with_status("{}".to_string(), StatusCode::OK)
        });

    let (addr, server) = warp::serve(token.or(upload)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

fn client(addr: SocketAddr, refresh_token: &str) -> DropboxMirror {
    let base = format!("http://{addr}");
    DropboxMirror::with_endpoints(credentials(refresh_token), base.clone(), base).unwrap()
}

#[tokio::test]
async fn connect_refreshes_once_and_caches() {
    let fake = Arc::new(FakeDropbox::default());
    let addr = spawn_fake(fake.clone());
    let remote = client(addr, "good-refresh");

    remote.connect().await.unwrap();
    remote.connect().await.unwrap();
    remote
        .upload("/Casos/Ana/estado.json", b"{}".to_vec())
        .await
        .unwrap();

    assert_eq!(fake.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upload_sends_overwrite_arg_and_body() {
    let fake = Arc::new(FakeDropbox::default());
    let addr = spawn_fake(fake.clone());
    let remote = client(addr, "good-refresh");

    remote
        .upload("/Casos/Juan Pérez/modelo.stl", b"solid".to_vec())
        .await
        .unwrap();

    let uploads = fake.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let (_, arg, body) = &uploads[0];
    let parsed: serde_json::Value = serde_json::from_str(arg).unwrap();
    assert_eq!(parsed["path"], "/Casos/Juan Pérez/modelo.stl");
    assert_eq!(parsed["mode"], "overwrite");
    assert_eq!(body.as_slice(), b"solid");
}

#[tokio::test]
async fn rejected_refresh_is_remote_unavailable() {
    let fake = Arc::new(FakeDropbox::default());
    let addr = spawn_fake(fake.clone());
    let remote = client(addr, "revoked");

    let err = remote.connect().await.unwrap_err();

    assert!(matches!(err, LimsError::RemoteUnavailable(ref m) if m.contains("invalid_grant")));
}

#[tokio::test]
async fn rejected_upload_reports_path() {
    let fake = Arc::new(FakeDropbox::default());
    let addr = spawn_fake(fake.clone());
    let remote = client(addr, "good-refresh");

    let err = remote
        .upload("/Casos/rechazar/estado.json", Vec::new())
        .await
        .unwrap_err();

    match err {
        LimsError::RemoteUnavailable(message) => {
            assert!(message.contains("/Casos/rechazar/estado.json"));
            assert!(message.contains("409"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(fake.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_host_is_remote_unavailable() {
    let remote = DropboxMirror::with_endpoints(
        credentials("good-refresh"),
        "http://127.0.0.1:9",
        "http://127.0.0.1:9",
    )
    .unwrap();

    let err = remote.connect().await.unwrap_err();

    assert!(matches!(err, LimsError::RemoteUnavailable(_)));
}
