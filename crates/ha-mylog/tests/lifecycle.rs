//! MyLog accounts driven through the config entry machinery

use std::collections::HashMap;
use std::sync::Arc;

use ha_config_entries::{
    ConfigEntries, ConfigEntry, ConfigEntryState, FlowManager, FlowResultType, Storage,
};
use ha_mylog::{MyLogError, MyLogIntegration, DOMAIN, SERVICE_SEND_BATCH, SERVICE_SEND_LOG};
use ha_service_registry::{ServiceError, ServiceRegistry};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tempfile::TempDir;

struct Home {
    dir: TempDir,
    services: Arc<ServiceRegistry>,
    entries: Arc<ConfigEntries>,
    flows: FlowManager,
}

fn home(server: &ServerGuard) -> Home {
    let dir = TempDir::new().unwrap();
    let services = Arc::new(ServiceRegistry::new());
    let entries = Arc::new(ConfigEntries::new(Arc::new(Storage::new(dir.path()))));
    entries.register_integration(Arc::new(MyLogIntegration::with_api_url(
        services.clone(),
        server.url(),
    )));
    let flows = FlowManager::new(entries.clone());
    Home {
        dir,
        services,
        entries,
        flows,
    }
}

async fn healthy(server: &mut ServerGuard) {
    server
        .mock("GET", "/health")
        .with_status(200)
        .with_body(r#"{"status": "ok"}"#)
        .create_async()
        .await;
}

async fn add_account(home: &Home, api_key: &str) -> String {
    let form = home.flows.start_flow(DOMAIN).await.unwrap();
    let result = home
        .flows
        .progress_flow(&form.flow_id, Some(json!({ "api_key": api_key })))
        .await
        .unwrap();
    assert_eq!(result.result_type, FlowResultType::CreateEntry);
    result.result.unwrap()
}

#[tokio::test]
async fn test_account_setup_call_and_unload() {
    let mut server = Server::new_async().await;
    healthy(&mut server).await;
    let send = server
        .mock("POST", "/api/v1/logs")
        .match_header("x-api-key", "mlk_home")
        .match_body(Matcher::Json(json!({
            "title": "Door opened",
            "severity": "high",
            "priority": 0
        })))
        .with_status(201)
        .with_body(r#"{"id": 17}"#)
        .create_async()
        .await;
    let home = home(&server);

    let entry_id = add_account(&home, "mlk_home").await;
    assert!(home.entries.get(&entry_id).unwrap().is_loaded());
    assert!(home.services.has_service(DOMAIN, SERVICE_SEND_LOG));
    assert!(home.services.has_service(DOMAIN, SERVICE_SEND_BATCH));

    let response = home
        .services
        .call(
            DOMAIN,
            SERVICE_SEND_LOG,
            json!({"title": "Door opened", "severity": "high"}),
            true,
        )
        .await
        .unwrap();
    assert_eq!(response, Some(json!({"id": 17})));
    send.assert_async().await;

    home.entries.unload(&entry_id).await.unwrap();
    assert_eq!(
        home.entries.get(&entry_id).unwrap().state,
        ConfigEntryState::NotLoaded
    );
    assert!(!home.services.has_service(DOMAIN, SERVICE_SEND_LOG));
    assert!(!home.services.has_service(DOMAIN, SERVICE_SEND_BATCH));
}

#[tokio::test]
async fn test_services_survive_until_last_account_unloads() {
    let mut server = Server::new_async().await;
    healthy(&mut server).await;
    let home = home(&server);

    let first = add_account(&home, "mlk_first").await;
    let second = add_account(&home, "mlk_second").await;
    assert_eq!(home.entries.get_by_domain(DOMAIN).len(), 2);

    home.entries.unload(&first).await.unwrap();
    assert!(home.services.has_service(DOMAIN, SERVICE_SEND_LOG));
    assert!(home.services.has_service(DOMAIN, SERVICE_SEND_BATCH));

    home.entries.remove(&second).await.unwrap();
    assert!(!home.services.has_service(DOMAIN, SERVICE_SEND_LOG));
    assert!(!home.services.has_service(DOMAIN, SERVICE_SEND_BATCH));
}

#[tokio::test]
async fn test_unreachable_service_leaves_entry_retrying() {
    let mut server = Server::new_async().await;
    let health = server
        .mock("GET", "/health")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let home = home(&server);

    let mut data = HashMap::new();
    data.insert("api_key".to_string(), json!("mlk_home"));
    let entry = home
        .entries
        .add(ConfigEntry::new(DOMAIN, "MyLog").with_data(data))
        .await
        .unwrap();

    assert!(home.entries.setup(&entry.entry_id).await.is_err());

    let entry = home.entries.get(&entry.entry_id).unwrap();
    assert_eq!(entry.state, ConfigEntryState::SetupRetry);
    assert!(entry.reason.unwrap().starts_with("Cannot connect to MyLog"));
    assert_eq!(home.services.service_count(), 0);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    health.assert_async().await;
    assert_eq!(
        home.entries.get(&entry.entry_id).unwrap().state,
        ConfigEntryState::SetupRetry
    );
}

#[tokio::test]
async fn test_entries_survive_restart() {
    let mut server = Server::new_async().await;
    healthy(&mut server).await;
    let home = home(&server);

    let entry_id = add_account(&home, "mlk_home").await;
    home.entries.save().await.unwrap();
    home.entries.unload_all().await;

    let restarted = Arc::new(ConfigEntries::new(Arc::new(Storage::new(home.dir.path()))));
    let services = Arc::new(ServiceRegistry::new());
    restarted.register_integration(Arc::new(MyLogIntegration::with_api_url(
        services.clone(),
        server.url(),
    )));
    restarted.load().await.unwrap();

    for result in restarted.setup_all().await {
        result.unwrap();
    }

    let entry = restarted.get(&entry_id).unwrap();
    assert_eq!(entry.unique_id.as_deref(), Some("mlk_home"));
    assert!(entry.is_loaded());
    assert!(services.has_service(DOMAIN, SERVICE_SEND_LOG));
}

#[tokio::test]
async fn test_rejected_key_reaches_service_caller() {
    let mut server = Server::new_async().await;
    healthy(&mut server).await;
    server
        .mock("POST", "/api/v1/logs/batch")
        .with_status(401)
        .with_body(r#"{"error": "Invalid API key"}"#)
        .create_async()
        .await;
    let home = home(&server);
    add_account(&home, "mlk_home").await;

    let err = home
        .services
        .call(
            DOMAIN,
            SERVICE_SEND_BATCH,
            json!({"entries": [{"title": "a"}]}),
            false,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Handler { .. }));
    assert_eq!(
        err.handler_error::<MyLogError>(),
        Some(&MyLogError::Auth("Invalid API key".into()))
    );
}
