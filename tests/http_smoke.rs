//! Real socket round trip through `may_minihttp`.

use bursar::config::{BootstrapAdmin, BursarConfig};
use bursar::http::BursarService;
use bursar::AppState;
use may_minihttp::HttpServer;
use serde_json::Value;
use std::time::Duration;

fn start_server() -> String {
    let port = 41_000 + (std::process::id() % 2_000) as u16;
    let addr = format!("127.0.0.1:{port}");
    let state = AppState::in_memory(&BursarConfig::default());
    state
        .auth
        .ensure_admin(&BootstrapAdmin {
            username: "admin".into(),
            password: "smoke".into(),
            nom: None,
        })
        .unwrap();
    // The server runs for the rest of the test process.
    let _server = HttpServer(BursarService::new(state)).start(&addr).unwrap();

    let base = format!("http://{addr}");
    for _ in 0..50 {
        if ureq::get(&format!("{base}/health")).call().is_ok() {
            return base;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("server did not come up on {addr}");
}

#[test]
fn test_login_and_authenticated_call_over_http() {
    let base = start_server();

    let health: Value = serde_json::from_str(
        &ureq::get(&format!("{base}/health"))
            .call()
            .unwrap()
            .into_string()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(health["status"], "ok");

    match ureq::get(&format!("{base}/api/eleves/classes")).call() {
        Err(ureq::Error::Status(code, _)) => assert_eq!(code, 401),
        other => panic!("expected 401, got {other:?}"),
    }

    let login = ureq::post(&format!("{base}/api/users/login"))
        .set("Content-Type", "application/json")
        .send_string(r#"{"username":"admin","password":"smoke"}"#)
        .unwrap();
    assert_eq!(login.status(), 200);
    let login: Value = serde_json::from_str(&login.into_string().unwrap()).unwrap();
    let token = login["token"].as_str().unwrap();

    let classes = ureq::get(&format!("{base}/api/eleves/classes"))
        .set("Authorization", &format!("Bearer {token}"))
        .call()
        .unwrap();
    assert_eq!(classes.status(), 200);
    assert!(classes.content_type().starts_with("application/json"));
    assert_eq!(classes.into_string().unwrap(), "[]");
}
