use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use taskflow::prelude::*;

fn config_for(server: &Server) -> ClientConfig {
    ClientConfig {
        worker_url: "http://127.0.0.1".to_string(),
        worker_port: server.socket_address().port(),
        app_id: Some("app-42".to_string()),
        api_token: Some("secret".to_string()),
        app_env: Some("dev".to_string()),
        ..ClientConfig::default()
    }
}

fn app_query() -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("app_env".into(), "dev".into()),
        Matcher::UrlEncoded("app_id".into(), "app-42".into()),
    ])
}

#[tokio::test]
async fn start_workflow_posts_an_instance() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v_newton/instances")
        .match_query(app_query())
        .match_body(Matcher::PartialJson(json!({
            "programming_language": "Rust",
            "name": "WelcomeFlow",
            "custom_id": "user-1",
            "data": "{\"email\":\"someone@example.com\"}",
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"instance-1"}"#)
        .create_async()
        .await;

    let client = WorkerClient::connect(config_for(&server)).unwrap();
    let workflow = Workflow::builder("WelcomeFlow", |_| async { anyhow::Ok(()) })
        .id(|| "user-1".to_string())
        .data(json!({"email": "someone@example.com"}))
        .build();

    let response = workflow.start(&client).await.unwrap();
    assert_eq!(response, json!({"id": "instance-1"}));
    mock.assert_async().await;
}

#[tokio::test]
async fn send_event_posts_to_events() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v_newton/events")
        .match_query(app_query())
        .match_body(Matcher::PartialJson(json!({
            "name": "WelcomeFlow",
            "custom_id": "user-1",
            "event_name": "Clicked",
            "event_input": "{\"button\":\"ok\"}",
        })))
        .with_status(200)
        .create_async()
        .await;

    let client = WorkerClient::connect(config_for(&server)).unwrap();
    let response = client
        .send_event("WelcomeFlow", "user-1", "Clicked", &json!({"button": "ok"}))
        .await
        .unwrap();
    assert!(response.is_null());
    mock.assert_async().await;
}

#[tokio::test]
async fn lifecycle_updates_put_the_requested_mode() {
    let mut server = Server::new_async().await;
    let mut mocks = Vec::new();
    for mode in ["kill", "pause", "run"] {
        mocks.push(
            server
                .mock("PUT", "/api/v_newton/instances")
                .match_query(Matcher::AllOf(vec![
                    app_query(),
                    Matcher::UrlEncoded("custom_id".into(), "user-1".into()),
                    Matcher::UrlEncoded("name".into(), "WelcomeFlow".into()),
                ]))
                .match_body(Matcher::PartialJson(json!({ "mode": mode })))
                .with_status(200)
                .create_async()
                .await,
        );
    }

    let client = WorkerClient::connect(config_for(&server)).unwrap();
    let workflow = Workflow::builder("WelcomeFlow", |_| async { anyhow::Ok(()) }).build();
    workflow.kill(&client, "user-1").await.unwrap();
    workflow.pause(&client, "user-1").await.unwrap();
    workflow.resume(&client, "user-1").await.unwrap();

    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn error_statuses_are_reported() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v_newton/instances")
        .match_query(Matcher::Any)
        .with_status(422)
        .with_body("unknown workflow")
        .create_async()
        .await;

    let client = WorkerClient::connect(config_for(&server)).unwrap();
    let result = client.start_workflow("Missing", None, &json!({})).await;
    match result {
        Err(ClientError::Status { status, body }) => {
            assert_eq!(status, 422);
            assert_eq!(body, "unknown workflow");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn runtime_builds_clients_from_its_configuration() {
    let server = Server::new_async().await;
    let runtime = Arc::new(Runtime::new(RuntimeConfig {
        client: config_for(&server),
        ..RuntimeConfig::default()
    }));
    let client = runtime.client().unwrap();
    assert_eq!(client.config().worker_port, server.socket_address().port());
}
