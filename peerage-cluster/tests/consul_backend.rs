//! Consul backend against a mock agent
//!
//! Run with: cargo test -p peerage-cluster --test consul_backend

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use peerage_cluster::discovery::consul::{HttpRegistryClient, RegistryClient, RegistryRequest};
use peerage_cluster::{
    ClusterNodeId, ConsulBackend, DiscoveryBackend, Error, HealthCheckLoop, NodeNaming,
    RecoveryOutcome, RecoveryPolicy, TickOutcome,
};
use peerage_core::ConsulConfig;

fn web_config() -> ConsulConfig {
    ConsulConfig {
        service: "web".to_string(),
        service_port: 8080,
        service_address: Some("10.0.0.5".to_string()),
        service_ttl: Some(30),
        deregister_after: Some(90),
        cluster_name: Some("blue".to_string()),
        acl_token: Some("acl-token".to_string()),
        ..Default::default()
    }
}

fn backend(server: &MockServer, config: ConsulConfig) -> Arc<ConsulBackend> {
    let client = HttpRegistryClient::with_client(reqwest::Client::new(), &server.uri())
        .expect("mock server URI is valid");
    Arc::new(ConsulBackend::with_client(
        Arc::new(client),
        config,
        NodeNaming::new("peerage", false),
        ClusterNodeId::new("peerage@10.0.0.5"),
        "node-a".to_string(),
    ))
}

fn health_entry(node: &str, address: &str, status: &str) -> serde_json::Value {
    json!({
        "Node": {"Node": node, "Address": "172.16.0.1"},
        "Service": {"ID": format!("web:{address}"), "Service": "web", "Address": address, "Port": 8080},
        "Checks": [
            {"CheckID": "serfHealth", "Status": "passing"},
            {"CheckID": format!("service:web:{address}"), "Status": status}
        ]
    })
}

#[tokio::test]
async fn test_discover_sends_filters_and_maps_nodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/web"))
        .and(query_param("passing", ""))
        .and(query_param("tag", "blue"))
        .and(query_param("token", "acl-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            health_entry("node-b", "10.0.0.6", "passing"),
            health_entry("node-a", "10.0.0.5", "passing"),
            health_entry("node-c", "", "passing"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let nodes = backend(&server, web_config()).discover().await.unwrap();
    assert_eq!(
        nodes,
        vec![
            ClusterNodeId::new("peerage@10.0.0.5"),
            ClusterNodeId::new("peerage@10.0.0.6"),
            ClusterNodeId::new("peerage@node-c"),
        ]
    );
}

#[tokio::test]
async fn test_discover_with_warnings_filters_client_side() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/web"))
        .and(query_param_is_missing("passing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            health_entry("node-a", "10.0.0.5", "warning"),
            health_entry("node-b", "10.0.0.6", "critical"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = ConsulConfig {
        include_nodes_with_warnings: true,
        ..web_config()
    };
    let nodes = backend(&server, config).discover().await.unwrap();
    assert_eq!(nodes, vec![ClusterNodeId::new("peerage@10.0.0.5")]);
}

#[tokio::test]
async fn test_register_posts_consul_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/agent/service/register"))
        .and(query_param("token", "acl-token"))
        .and(body_partial_json(json!({
            "ID": "web:10.0.0.5",
            "Name": "web",
            "Address": "10.0.0.5",
            "Port": 8080,
            "Check": {"TTL": "30s", "DeregisterCriticalServiceAfter": "90s"},
            "Tags": ["blue"],
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server, web_config()).register().await.unwrap();
}

#[tokio::test]
async fn test_deregister_and_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/service/deregister/web:10.0.0.5"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Permission denied"))
        .expect(1)
        .mount(&server)
        .await;

    let err = backend(&server, web_config()).deregister().await.unwrap_err();
    match err {
        Error::Registry { status, reason } => {
            assert_eq!(status, 403);
            assert_eq!(reason, "Permission denied");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_invalid_json_is_serialization_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/web"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let err = backend(&server, web_config()).discover().await.unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/check/pass/service:web"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = HttpRegistryClient::with_client(reqwest::Client::new(), &server.uri()).unwrap();
    let value = client
        .send(RegistryRequest::get(["v1", "agent", "check", "pass", "service:web"]))
        .await
        .unwrap();
    assert!(value.is_null());
}

#[tokio::test]
async fn test_internal_fault_with_missing_node_reregisters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/check/pass/service:web:10.0.0.5"))
        .respond_with(ResponseTemplate::new(500).set_body_string("rpc error: No cluster leader"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/web"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([health_entry("node-b", "10.0.0.6", "passing")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let health_loop = HealthCheckLoop::with_policy(
        backend(&server, web_config()),
        Duration::from_secs(30),
        RecoveryPolicy {
            max_attempts: 3,
            retry_interval: Duration::from_millis(10),
        },
    );
    assert_eq!(
        health_loop.tick().await,
        TickOutcome::Recovered(RecoveryOutcome::Reregistered)
    );
}

#[tokio::test]
async fn test_internal_fault_with_registry_down_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/check/pass/service:web:10.0.0.5"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/web"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let health_loop = HealthCheckLoop::with_policy(
        backend(&server, web_config()),
        Duration::from_secs(30),
        RecoveryPolicy {
            max_attempts: 3,
            retry_interval: Duration::from_millis(10),
        },
    );
    assert_eq!(
        health_loop.tick().await,
        TickOutcome::Recovered(RecoveryOutcome::RegistryUnavailable)
    );
}
