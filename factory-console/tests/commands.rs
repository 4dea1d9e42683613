use factory_console::chat::UNREACHABLE;
use factory_console::commands::ResetOutcome;
use factory_console::error::ConsoleError;
use factory_console::models::{AlertType, Severity};
use factory_console::selection::SelectionPolicy;
use factory_console::{BackendClient, CommandDispatcher, FactoryHub, MachineCommand};
use factory_devkit::{init_test_logging, sample_factory, BackendStub, Failure};
use serde_json::json;
use std::time::Duration;

async fn setup() -> (BackendStub, CommandDispatcher) {
    init_test_logging();
    let stub = BackendStub::start().await.unwrap();
    let hub = FactoryHub::new(SelectionPolicy::default());
    let dispatcher = CommandDispatcher::new(hub, BackendClient::new(stub.url()));
    (stub, dispatcher)
}

#[tokio::test]
async fn test_control_success_adds_no_alert() {
    let (stub, dispatcher) = setup().await;
    dispatcher.control_machine("L1-CUT-01", MachineCommand::Start).await.unwrap();

    let requests = stub.requests_to("/api/v1/machines/L1-CUT-01/control");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, json!({ "command": "start" }));
    assert!(dispatcher.hub().all_alerts().is_empty());
}

#[tokio::test]
async fn test_control_http_failure_adds_one_alert_without_retry() {
    let (stub, dispatcher) = setup().await;
    stub.fail_control(Some(Failure::status(500)));

    let err = dispatcher.control_machine("M1", MachineCommand::Stop).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Status { status: 500 }));

    let alerts = dispatcher.hub().all_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::System);
    assert_eq!(alerts[0].severity, Severity::Medium);
    assert_eq!(alerts[0].machine_id, "M1");
    assert_eq!(alerts[0].message, "Failed to stop machine: backend answered 500");
    assert_eq!(stub.requests_to("/api/v1/machines/M1/control").len(), 1);
}

#[tokio::test]
async fn test_control_rejected_in_body_counts_as_failure() {
    let (stub, dispatcher) = setup().await;
    stub.reject_control("Failed to send command (Simulation disconnected?)");

    assert!(dispatcher.control_machine("M1", MachineCommand::Reset).await.is_err());
    let alerts = dispatcher.hub().all_alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].message.contains("Simulation disconnected"));
}

#[tokio::test]
async fn test_repeated_commands_are_not_deduplicated() {
    let (stub, dispatcher) = setup().await;
    stub.fail_control(Some(Failure::status(502)));

    dispatcher.dispatch_control("M1", MachineCommand::Stop).await.unwrap();
    dispatcher.dispatch_control("M1", MachineCommand::Stop).await.unwrap();

    assert_eq!(stub.requests_to("/api/v1/machines/M1/control").len(), 2);
    let ids: Vec<String> = dispatcher.hub().all_alerts().into_iter().map(|a| a.id).collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn test_autonomy_toggle_and_refresh() {
    let (stub, dispatcher) = setup().await;
    assert!(dispatcher.refresh_autonomy().await.unwrap());
    assert_eq!(dispatcher.hub().autonomy(), Some(true));

    dispatcher.toggle_autonomy(false).await.unwrap();
    assert!(!stub.autonomy());
    assert_eq!(dispatcher.hub().autonomy(), Some(false));

    stub.fail_autonomy(Some(Failure::status(500)));
    assert!(dispatcher.toggle_autonomy(true).await.is_err());
    assert_eq!(dispatcher.hub().autonomy(), Some(false));
}

#[tokio::test]
async fn test_late_failure_does_not_revert_newer_toggle() {
    let (stub, dispatcher) = setup().await;
    dispatcher.refresh_autonomy().await.unwrap();

    // la première bascule échoue lentement ; une plus récente arrive entre
    // temps. Un retour périmé remettrait `true`.
    stub.fail_autonomy(Some(Failure::status(500).after(Duration::from_millis(300))));
    let slow = {
        let d = dispatcher.clone();
        tokio::spawn(async move { d.toggle_autonomy(false).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    stub.fail_autonomy(None);
    dispatcher.toggle_autonomy(false).await.unwrap();

    assert!(slow.await.unwrap().is_err());
    assert_eq!(dispatcher.hub().autonomy(), Some(false));
}

#[tokio::test]
async fn test_reset_requires_confirmation_then_reloads() {
    let (stub, dispatcher) = setup().await;
    dispatcher.hub().apply_message(&sample_factory().to_string());
    dispatcher.hub().select_by_id("L1-CUT-01");

    let declined = dispatcher.reset_factory(|| false).await.unwrap();
    assert_eq!(declined, ResetOutcome::Declined);
    assert!(stub.requests_to("/api/reset").is_empty());
    assert!(dispatcher.hub().snapshot().is_some());

    let done = dispatcher.reset_factory(|| true).await.unwrap();
    assert_eq!(done, ResetOutcome::Reset);
    assert_eq!(stub.requests_to("/api/reset").len(), 1);
    assert!(dispatcher.hub().snapshot().is_none());
    assert!(dispatcher.hub().selected().is_none());
}

#[tokio::test]
async fn test_failed_reset_keeps_state() {
    let (stub, dispatcher) = setup().await;
    stub.fail_reset(Some(Failure::status(500)));
    dispatcher.hub().apply_message(&sample_factory().to_string());

    assert!(dispatcher.reset_factory(|| true).await.is_err());
    assert!(dispatcher.hub().snapshot().is_some());
}

#[tokio::test]
async fn test_chat_exchange() {
    let (stub, dispatcher) = setup().await;
    stub.set_chat_reply("Stopping the packer now. [[EXECUTE:stop|L1-PAC-01]]");

    let reply = dispatcher.send_chat("Stop the packer").await.unwrap();
    assert!(reply.contains("[[EXECUTE:"));

    let messages = dispatcher.hub().chat_messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].display_text(), "Stopping the packer now.");
    assert_eq!(stub.requests_to("/api/v1/chat")[0].body, json!({ "message": "Stop the packer" }));
    // les tags sont affichés seulement, rien n'est envoyé à la machine
    assert!(stub.requests_to("/api/v1/machines/L1-PAC-01/control").is_empty());
}

#[tokio::test]
async fn test_chat_backend_error_answers_with_apology() {
    let (stub, dispatcher) = setup().await;
    stub.fail_chat(Some(Failure::status(503)));

    let reply = dispatcher.send_chat("Status of line 1?").await.unwrap();
    assert_eq!(reply, UNREACHABLE);

    let messages = dispatcher.hub().chat_messages();
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| !m.is_loading));
    assert_eq!(messages[2].content, UNREACHABLE);
    assert_eq!(stub.requests_to("/api/v1/chat").len(), 1);
}

#[tokio::test]
async fn test_latest_snapshot_seed() {
    let (stub, dispatcher) = setup().await;
    let client = BackendClient::new(stub.url());
    assert!(client.latest_snapshot().await.unwrap().is_none());

    stub.set_latest(sample_factory());
    let snap = client.latest_snapshot().await.unwrap().unwrap();
    dispatcher.hub().apply_snapshot(snap);
    assert_eq!(dispatcher.hub().snapshot().unwrap().machines().count(), 5);
}
