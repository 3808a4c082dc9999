//! Firestore REST client against a mock server.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::{json, Value};
use stockkeeper::repositories::CategoryRepository;
use stockkeeper::store::firestore::{FirestoreOptions, FirestoreStore, ServiceAccountCredential};
use stockkeeper::store::{DocumentStore, FieldValue, Fields, Query, StoreError, StoreHandle};
use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIXTURE: &str = "tests/fixtures/service_account.json";
const TOKEN: &str = "ya29.test-token";
const DOCUMENT_PREFIX: &str = "projects/stockkeeper-test/databases/(default)/documents";

fn options(server: &MockServer) -> FirestoreOptions {
    FirestoreOptions {
        api_base_url: format!("{}/v1", server.uri()),
        request_timeout: Duration::from_secs(5),
        ..FirestoreOptions::default()
    }
}

fn credential(server: &MockServer) -> ServiceAccountCredential {
    let mut credential = ServiceAccountCredential::from_file(FIXTURE).expect("fixture credential");
    credential.token_uri = format!("{}/token", server.uri());
    credential
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": TOKEN,
            "expires_in": 3600,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn store(server: &MockServer) -> FirestoreStore {
    mount_token(server).await;
    FirestoreStore::new(credential(server), None, options(server)).expect("store")
}

fn error_body(code: u16, status: &str) -> Value {
    json!({ "error": { "code": code, "message": "mock failure", "status": status } })
}

async fn request_bodies(server: &MockServer, suffix: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path().ends_with(suffix))
        .map(|request| request.body_json::<Value>().expect("json body"))
        .collect()
}

#[tokio::test]
async fn query_sends_structured_equality_filters() {
    let server = MockServer::start().await;
    let store = store(&server).await;

    Mock::given(method("POST"))
        .and(path_regex(r"/documents:runQuery$"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "document": {
                    "name": format!("{}/products/abc123", DOCUMENT_PREFIX),
                    "fields": {
                        "id": { "integerValue": "7" },
                        "name": { "stringValue": "Mouse" },
                        "unitPrice": { "doubleValue": 10.5 },
                        "active": { "booleanValue": true },
                        "registeredAt": { "timestampValue": "2024-05-01T10:00:00.123456Z" }
                    }
                },
                "readTime": "2024-05-01T10:00:01Z"
            },
            { "readTime": "2024-05-01T10:00:01Z" }
        ])))
        .expect(2)
        .mount(&server)
        .await;

    let query = Query::collection("products")
        .where_eq("active", true)
        .where_eq("categoryId", 3)
        .limit(1);
    let docs = store.query(&query).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].collection, "products");
    assert_eq!(docs[0].id, "abc123");
    assert_eq!(docs[0].get("id"), Some(&FieldValue::Integer(7)));
    assert_eq!(docs[0].get("unitPrice"), Some(&FieldValue::Double(10.5)));

    // The token is cached across requests.
    store.query(&Query::collection("products")).await.unwrap();

    let bodies = request_bodies(&server, "documents:runQuery").await;
    let structured = &bodies[0]["structuredQuery"];
    assert_eq!(structured["from"], json!([{ "collectionId": "products" }]));
    assert_eq!(structured["limit"], json!(1));
    assert_eq!(structured["where"]["compositeFilter"]["op"], "AND");
    let filters = structured["where"]["compositeFilter"]["filters"]
        .as_array()
        .unwrap();
    assert_eq!(filters.len(), 2);
    assert_eq!(filters[1]["fieldFilter"]["field"]["fieldPath"], "categoryId");
    assert_eq!(filters[1]["fieldFilter"]["op"], "EQUAL");
    assert_eq!(filters[1]["fieldFilter"]["value"], json!({ "integerValue": "3" }));
    assert!(bodies[1]["structuredQuery"].get("where").is_none());
}

#[tokio::test]
async fn create_uses_precondition_and_server_timestamps() {
    let server = MockServer::start().await;
    let store = store(&server).await;

    Mock::given(method("POST"))
        .and(path_regex(r"/documents:commit$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "writeResults": [{ "updateTime": "2024-05-01T10:00:00.123456Z" }],
            "commitTime": "2024-05-01T10:00:00.123456Z"
        })))
        .mount(&server)
        .await;

    let mut fields = Fields::new();
    fields.insert("name".into(), FieldValue::from("Tools"));
    fields.insert("createdAt".into(), FieldValue::ServerTimestamp);
    let result = store.create("categories", "doc1", fields.clone()).await.unwrap();
    assert_eq!(
        result.commit_time.to_rfc3339(),
        "2024-05-01T10:00:00.123456+00:00"
    );

    store.update("categories", "doc1", fields).await.unwrap();
    store.delete("categories", "doc1").await.unwrap();

    let bodies = request_bodies(&server, "documents:commit").await;
    assert_eq!(bodies.len(), 3);

    let create = &bodies[0]["writes"][0];
    assert_eq!(create["update"]["name"], format!("{}/categories/doc1", DOCUMENT_PREFIX));
    assert_eq!(create["update"]["fields"]["name"], json!({ "stringValue": "Tools" }));
    assert!(create["update"]["fields"].get("createdAt").is_none());
    assert_eq!(create["currentDocument"]["exists"], json!(false));
    assert!(create.get("updateMask").is_none());
    assert_eq!(
        create["updateTransforms"],
        json!([{ "fieldPath": "createdAt", "setToServerValue": "REQUEST_TIME" }])
    );

    let update = &bodies[1]["writes"][0];
    assert_eq!(update["currentDocument"]["exists"], json!(true));
    assert_eq!(update["updateMask"]["fieldPaths"], json!(["name"]));

    let delete = &bodies[2]["writes"][0];
    assert_eq!(delete["delete"], format!("{}/categories/doc1", DOCUMENT_PREFIX));
}

#[tokio::test]
async fn missing_document_reads_as_none() {
    let server = MockServer::start().await;
    let store = store(&server).await;

    Mock::given(method("GET"))
        .and(path_regex(r"/documents/categories/missing$"))
        .respond_with(ResponseTemplate::new(404).set_body_json(error_body(404, "NOT_FOUND")))
        .mount(&server)
        .await;

    assert!(store.get("categories", "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn error_statuses_are_mapped() {
    let server = MockServer::start().await;
    let store = store(&server).await;

    Mock::given(method("POST"))
        .and(path_regex(r"/documents:commit$"))
        .respond_with(ResponseTemplate::new(404).set_body_json(error_body(404, "NOT_FOUND")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/documents:runQuery$"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(error_body(403, "PERMISSION_DENIED")),
        )
        .mount(&server)
        .await;

    assert_matches!(
        store.update("categories", "gone", Fields::new()).await,
        Err(StoreError::NotFound(_))
    );
    assert_matches!(
        store.query(&Query::collection("categories")).await,
        Err(StoreError::Unauthorized(_))
    );
}

#[tokio::test]
async fn rejected_token_exchange_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .mount(&server)
        .await;
    let store = FirestoreStore::new(credential(&server), None, options(&server)).unwrap();

    assert_matches!(store.access_token().await, Err(StoreError::Unauthorized(_)));
}

#[tokio::test]
async fn emulator_uses_the_owner_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/demo-project/databases/(default)/documents:runQuery"))
        .and(header("authorization", "Bearer owner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store = FirestoreStore::emulator(
        &server.address().to_string(),
        "demo-project",
        FirestoreOptions::default(),
    )
    .unwrap();
    assert!(store
        .query(&Query::collection("categories"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn repository_reads_through_the_rest_client() {
    let server = MockServer::start().await;
    let store = store(&server).await;

    Mock::given(method("POST"))
        .and(path_regex(r"/documents:runQuery$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "document": {
                    "name": format!("{}/categories/b", DOCUMENT_PREFIX),
                    "fields": {
                        "id": { "integerValue": "2" },
                        "nombre_categoria": { "stringValue": "Toys" }
                    }
                }
            },
            {
                "document": {
                    "name": format!("{}/categories/a", DOCUMENT_PREFIX),
                    "fields": {
                        "id": { "integerValue": "1" },
                        "name": { "stringValue": "Books" },
                        "createdAt": { "integerValue": "1600000000000" }
                    }
                }
            }
        ])))
        .mount(&server)
        .await;

    let repo = CategoryRepository::new(StoreHandle::new(Arc::new(store)));
    let names: Vec<_> = repo
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.id.value(), c.name))
        .collect();
    assert_eq!(names, vec![(1, "Books".to_string()), (2, "Toys".to_string())]);
}
