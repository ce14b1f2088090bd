//! Vector store client tests against a mock REST endpoint.

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use graph_rag_sync::config::AppConfig;
use graph_rag_sync::resilience::{BreakerRegistry, CircuitState};
use graph_rag_sync::store::{
    Distance, PayloadFilter, Point, PointId, StoreError, VectorStoreClient, GRAPH_RESOURCE, VECTOR_RESOURCE,
};
use graph_rag_sync::GraphStoreClient;

mod common;
use common::{breaker, fast_retry, vector_client, vector_ok, MockServer, Reply};

#[tokio::test]
async fn test_upsert_sends_points_with_api_key() {
    let server = MockServer::start(|_, _| {
        Reply::Json(200, vector_ok(json!({"operation_id": 1, "status": "completed"})))
    })
    .await;
    let client = vector_client(&server, breaker("vector-upsert", 5), fast_retry(1));

    let point = Point {
        id: PointId::from(7u64),
        vector: vec![0.5, 0.25],
        payload: json!({"name": "Acme"}).as_object().cloned().unwrap(),
    };
    client.upsert("customers", &[point]).await.unwrap();
    client.upsert("customers", &[]).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "PUT");
    assert_eq!(requests[0].path, "/collections/customers/points?wait=true");
    assert_eq!(requests[0].header("api-key"), Some("vector-key"));
    assert_eq!(
        requests[0].json(),
        json!({"points": [{"id": 7, "vector": [0.5, 0.25], "payload": {"name": "Acme"}}]})
    );
}

#[tokio::test]
async fn test_search_sends_filter_and_decodes_hits() {
    let id = Uuid::new_v4();
    let server = MockServer::start(move |_, _| {
        Reply::Json(
            200,
            vector_ok(json!([
                {"id": id.to_string(), "version": 3, "score": 0.92, "payload": {"name": "Acme"}},
                {"id": 5, "version": 1, "score": 0.41}
            ])),
        )
    })
    .await;
    let client = vector_client(&server, breaker("vector-search", 5), fast_retry(1));

    let filter = PayloadFilter::must_match("entity_label", "Customer");
    let hits = client.search("customers", &[0.1, 0.2], 2, Some(&filter)).await.unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, PointId::Uuid(id));
    assert_eq!(hits[0].payload.as_ref().unwrap()["name"], json!("Acme"));
    assert_eq!(hits[1].id, PointId::Num(5));
    assert!(hits[1].payload.is_none());

    let body = server.requests()[0].json();
    assert_eq!(body["limit"], json!(2));
    assert_eq!(
        body["filter"],
        json!({"must": [{"key": "entity_label", "match": {"value": "Customer"}}]})
    );
}

#[tokio::test]
async fn test_collection_lifecycle_paths() {
    let server = MockServer::start(|request, _| match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/collections") => Reply::Json(
            200,
            vector_ok(json!({"collections": [{"name": "customers"}, {"name": "orders"}]})),
        ),
        ("GET", "/collections/customers/exists") => Reply::Json(200, vector_ok(json!({"exists": true}))),
        _ => Reply::Json(200, vector_ok(json!(true))),
    })
    .await;
    let client = vector_client(&server, breaker("vector-collections", 5), fast_retry(1));

    client.create_collection("customers", 384, Distance::Cosine).await.unwrap();
    assert!(client.collection_exists("customers").await.unwrap());
    assert_eq!(client.list_collections().await.unwrap(), vec!["customers", "orders"]);
    client.delete_collection("customers").await.unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].method, "PUT");
    assert_eq!(requests[0].path, "/collections/customers");
    assert_eq!(requests[0].json(), json!({"vectors": {"size": 384, "distance": "Cosine"}}));
    assert_eq!(requests[3].method, "DELETE");
}

#[tokio::test]
async fn test_invalid_collection_name_sends_nothing() {
    let server = MockServer::start(|_, _| Reply::Json(200, vector_ok(json!(true)))).await;
    let client = vector_client(&server, breaker("vector-injection", 5), fast_retry(1));

    for name in ["../admin", "customers/points", "", "has space"] {
        let err = client.delete_collection(name).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidIdentifier(_)), "accepted {name:?}");
    }
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn test_missing_collection_is_not_retried() {
    let server = MockServer::start(|_, _| {
        Reply::Json(
            404,
            json!({"status": {"error": "Not found: Collection `ghost` doesn't exist!"}, "time": 0.0}),
        )
    })
    .await;
    let breaker = breaker("vector-404", 5);
    let client = vector_client(&server, breaker.clone(), fast_retry(4));

    let err = client.count("ghost", None).await.unwrap_err();
    match err {
        StoreError::Upstream { status, message, .. } => {
            assert_eq!(status, 404);
            assert!(message.contains("doesn't exist"));
        }
        other => panic!("expected upstream error, got {other}"),
    }
    assert_eq!(server.request_count(), 1);
    assert_eq!(breaker.failure_count(), 1);
}

#[tokio::test]
async fn test_dropped_connections_are_retried() {
    let server = MockServer::start(|_, index| {
        if index < 2 {
            Reply::Drop
        } else {
            Reply::Json(200, vector_ok(json!({"count": 12})))
        }
    })
    .await;
    let breaker = breaker("vector-retry", 5);
    let client = vector_client(&server, breaker.clone(), fast_retry(3));

    assert_eq!(client.count("customers", None).await.unwrap(), 12);
    assert_eq!(server.request_count(), 3);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_clients_share_breakers_per_resource() {
    let registry = BreakerRegistry::new();
    let config = AppConfig::default();

    let graph_a = GraphStoreClient::from_app_config(&config, &registry).unwrap();
    let graph_b = GraphStoreClient::from_app_config(&config, &registry).unwrap();
    let vector = VectorStoreClient::from_app_config(&config, &registry).unwrap();

    assert!(Arc::ptr_eq(graph_a.resilience().breaker(), graph_b.resilience().breaker()));
    assert_eq!(graph_a.resilience().breaker().name(), GRAPH_RESOURCE);
    assert_eq!(vector.resilience().breaker().name(), VECTOR_RESOURCE);

    graph_a.resilience().breaker().record_failure();
    let names: Vec<String> = registry.snapshot().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec![GRAPH_RESOURCE, VECTOR_RESOURCE]);
    assert_eq!(graph_b.resilience().breaker().failure_count(), 1);
}
