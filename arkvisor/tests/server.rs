mod common;

use std::sync::Arc;

use arkutils::terminate_process;
use arkvisor::{
    orchestration::{Orchestrator, VmStatus},
    server::{create_router, ErrorResponse, HelperResponse, ServerState},
    ErrorKind,
};
use reqwest::StatusCode;
use serial_test::serial;
use tempfile::tempdir;
use tokio::net::TcpListener;

use common::{test_config, write_package, FakeProcessTable};

//--------------------------------------------------------------------------------------------------
// Function: Helper
//--------------------------------------------------------------------------------------------------

/// Serves the API over `table` on an ephemeral port and returns its base URL.
async fn spawn_api(dir: &std::path::Path, table: Arc<FakeProcessTable>) -> anyhow::Result<String> {
    let config = test_config(dir, "http://127.0.0.1:9")?;
    let orchestrator = Orchestrator::with_process_table(config, table)?;
    let router = create_router(ServerState::new(Arc::new(orchestrator)));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, router).await });

    Ok(format!("http://{addr}"))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_malformed_bodies_are_rejected() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = spawn_api(dir.path(), Arc::new(FakeProcessTable::default())).await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/vm/create"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await?;
    assert_eq!(body.code, 400);
    assert_eq!(body.error_type, ErrorKind::Validation);
    assert!(!body.message.is_empty());

    let response = client
        .post(format!("{base}/vm/create"))
        .json(&serde_json::json!({ "memory": "1024" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{base}/vm/migrate/demo"))
        .json(&serde_json::json!({}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was created for any of them.
    assert!(!dir.path().join("out").exists());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_status_endpoint() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let table = FakeProcessTable::with_entries(&[
        (300, "drafter-nat --host-interface eth0"),
        (301, "ark-demo:drafter-forwarder --port-forwards []"),
    ]);
    let base = spawn_api(dir.path(), table).await?;

    let response = reqwest::get(format!("{base}/vm/status/demo")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(
        body,
        serde_json::json!({
            "name": "demo",
            "services": { "nat": true, "peer": false, "forwarder": true }
        })
    );

    let status = VmStatus {
        name: "demo".to_string(),
        services: Default::default(),
    };
    assert_eq!(serde_json::to_value(status)?["services"]["peer"], false);

    let response = reqwest::get(format!("{base}/vm/status/bad%20name")).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_errors_carry_their_kind() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = spawn_api(dir.path(), Arc::new(FakeProcessTable::default())).await?;
    let client = reqwest::Client::new();

    let response = client.post(format!("{base}/vm/start/demo")).send().await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = response.json().await?;
    assert_eq!(body.code, 500);
    assert_eq!(body.error_type, ErrorKind::Precondition);
    assert!(body.message.contains("demo"));

    let response = reqwest::get(format!("{base}/vm/logs/demo?tail=5")).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = response.json().await?;
    assert_eq!(body.error_type, ErrorKind::Precondition);

    let response = reqwest::get(format!("{base}/vm/logs/demo?tail=many")).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_stop_endpoint() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let table = FakeProcessTable::with_entries(&[
        (400, "ark-demo:drafter-peer --netns ark0"),
        (401, "ark-other:drafter-peer --netns ark0"),
    ]);
    let base = spawn_api(dir.path(), table.clone()).await?;

    let response = reqwest::Client::new()
        .post(format!("{base}/vm/stop/demo"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["message"], "VM stopped");
    assert_eq!(body["name"], "demo");
    assert_eq!(body["terminated"], serde_json::json!([400]));
    assert_eq!(table.terminated(), vec![400]);
    Ok(())
}

#[test_log::test(tokio::test)]
#[serial]
async fn test_start_endpoint_reports_helper_states() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_package(&test_config(dir.path(), "http://127.0.0.1:9")?, "demo")?;
    let base = spawn_api(dir.path(), Arc::new(FakeProcessTable::default())).await?;

    let response = reqwest::Client::new()
        .post(format!("{base}/vm/start/demo"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await?;
    let helpers: Vec<HelperResponse> = serde_json::from_value(body["helpers"].clone())?;
    for helper in &helpers {
        terminate_process(helper.pid)?;
    }

    assert_eq!(body["message"], "VM started");
    assert_eq!(
        helpers.iter().map(|h| h.component.as_str()).collect::<Vec<_>>(),
        vec!["peer", "forwarder"]
    );
    for helper in &helpers {
        assert!(["spawned", "ready"].contains(&helper.state.as_str()), "{helper:?}");
        assert_eq!(helper.exit_code, None);
    }

    Ok(())
}
