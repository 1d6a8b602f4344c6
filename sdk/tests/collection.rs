//! Collections: pagination, bulk saves and remote deletes

use anyhow::{Result, anyhow};
use restmodel_sdk::entity::{
    CastKind, Definition, Entity, EntityCollection, EntityError, IndexAccess, Model,
};
use restmodel_sdk::query::QueryBuilder;
use restmodel_sdk::testing::{MemoryTransport, Method};
use restmodel_sdk::transport::{ApiResponse, Transport};
use serde_json::{Value, json};
use std::sync::Arc;

struct Post;

impl Model for Post {
    fn define() -> Definition {
        Definition::new("Post")
            .path("/posts")
            .cast("id", CastKind::Id)
            .cast("title", CastKind::String)
            .cast("published", CastKind::Boolean)
            .scope("status", "visible")
    }
}

fn setup() -> (Arc<MemoryTransport>, EntityCollection) {
    let transport = Arc::new(MemoryTransport::new());
    let posts = EntityCollection::of::<Post>(transport.clone());
    (transport, posts)
}

fn page(items: serde_json::Value, current: u32, last: u32, total: u64) -> ApiResponse {
    ApiResponse::ok(json!({
        "data": items,
        "meta": {
            "current_page": current,
            "last_page": last,
            "per_page": 2,
            "total": total,
        }
    }))
}

#[tokio::test]
async fn test_paginate_replaces_elements_and_reads_meta() {
    let (transport, mut posts) = setup();
    transport
        .respond(
            Method::Get,
            "/posts",
            page(json!([{ "id": 1, "title": "a" }, { "id": 2, "title": "b" }]), 1, 3, 6),
        )
        .respond(Method::Get, "/posts", page(json!([{ "id": 3, "title": "c" }]), 2, 3, 6));

    posts.paginate(Some(1), Some(2), "title", false).await.unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts.pagination().total(), 6);
    assert_eq!(posts.pagination().last_page(), 3);
    assert_eq!(posts.pagination().to_string(), "6");
    assert!(!posts.is_loading());

    let request = transport.last_request().await.unwrap();
    assert_eq!(
        request.query.to_json(),
        json!({
            "status": "visible",
            "page": 1,
            "pagination": { "per_page": 2 },
            "sort": { "by": "title", "order": "asc" },
        })
    );

    posts.paginate(Some(2), None, "title", true).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(*posts.first().get("title"), json!("c"));
    assert_eq!(posts.pagination().current_page(), 2);

    let request = transport.last_request().await.unwrap();
    assert_eq!(request.query.first("page"), Some(&json!(2)));
    assert_eq!(request.query.first("sort.order"), Some(&json!("desc")));
}

#[tokio::test]
async fn test_failed_paginate_keeps_elements() {
    let (transport, mut posts) = setup();
    posts.set_items(&json!([{ "id": 1 }]));
    transport.respond(
        Method::Get,
        "/posts",
        ApiResponse::new(500, json!({ "message": "Server Error" }), "Internal Server Error"),
    );

    let err = posts.paginate(None, None, "id", true).await.unwrap_err();
    assert!(matches!(err, EntityError::RemoteOperationFailed { status: 500, .. }));
    assert_eq!(posts.len(), 1);
    assert!(!posts.is_loading());
}

#[tokio::test]
async fn test_paginate_from_query() {
    let (transport, mut posts) = setup();
    transport.respond(Method::Get, "/posts", page(json!([]), 4, 4, 7));

    posts
        .paginate_from_query(&json!({ "currentPage": "4", "perPage": 2, "sortDesc": "true" }))
        .await
        .unwrap();

    let request = transport.last_request().await.unwrap();
    assert_eq!(request.query.first("page"), Some(&json!(4)));
    assert_eq!(request.query.first("sort.by"), Some(&json!("id")));
    assert_eq!(request.query.first("sort.order"), Some(&json!("desc")));
    assert!(posts.is_empty());
}

#[tokio::test]
async fn test_paginate_from_query_ignores_oversized_numbers() {
    let (transport, mut posts) = setup();
    transport.respond(Method::Get, "/posts", page(json!([]), 1, 1, 0));

    posts
        .paginate_from_query(&json!({ "perPage": 4294967297u64, "currentPage": 4294967298u64 }))
        .await
        .unwrap();

    let request = transport.last_request().await.unwrap();
    assert_eq!(request.query.first("pagination.per_page"), Some(&json!(15)));
    assert_eq!(request.query.first("page"), Some(&json!(1)));
}

#[tokio::test]
async fn test_save_each_one_reports_in_index_order() {
    let (transport, mut posts) = setup();
    posts.set_items(&json!([
        { "id": 1, "title": "kept" },
        { "id": 2, "title": "" },
        { "title": "new" },
    ]));
    transport
        .respond_always(Method::Post, "/posts/1", ApiResponse::ok(json!({})))
        .respond_always(
            Method::Post,
            "/posts/2",
            ApiResponse::with_status(422, json!({ "errors": { "title": ["validation.required"] } })),
        )
        .respond_always(Method::Post, "/posts", ApiResponse::ok(json!({ "id": 3 })));

    let report = posts.save_each_one().await;

    assert!(!report.ok);
    assert_eq!(report.message, "There was an error saving your changes.");
    let indexes: Vec<_> = report.responses.iter().map(|outcome| outcome.index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    let failed: Vec<_> = report.responses.iter().map(|outcome| outcome.failed).collect();
    assert_eq!(failed, vec![false, true, false]);
    assert_eq!(report.failed().count(), 1);
    assert_eq!(report.responses[1].response.status(), 422);

    assert_eq!(posts.at(2).primary_key_value(), Some(json!(3)));
    assert_eq!(posts.at(1).feedback("title"), "required");
    assert!(!posts.is_loading());
}

#[tokio::test]
async fn test_save_each_one_all_ok() {
    let (transport, mut posts) = setup();
    posts.set_items(&json!([{ "id": 1 }, { "id": 2 }]));
    transport
        .respond_always(Method::Post, "/posts/1", ApiResponse::ok(json!({})))
        .respond_always(Method::Post, "/posts/2", ApiResponse::ok(json!({})));

    let report = posts.save_each_one().await;
    assert!(report.ok);
    assert_eq!(report.message, "All resources saved.");
}

struct OfflineTransport;

#[restmodel_sdk::async_trait]
impl Transport for OfflineTransport {
    async fn get(&self, _path: &str, _query: &QueryBuilder) -> Result<ApiResponse> {
        Err(anyhow!("network unreachable"))
    }

    async fn post(&self, _path: &str, _body: &Value, _query: &QueryBuilder) -> Result<ApiResponse> {
        Err(anyhow!("network unreachable"))
    }

    fn abort(&self) {}
}

#[tokio::test]
async fn test_save_each_one_marks_transport_errors_as_failed_responses() {
    let mut posts = EntityCollection::of::<Post>(Arc::new(OfflineTransport));
    posts.set_items(&json!([{ "id": 1, "title": "a" }]));

    let report = posts.save_each_one().await;
    assert!(!report.ok);
    let outcome = &report.responses[0];
    assert!(outcome.failed);
    assert!(outcome.response.failed());
    assert_eq!(outcome.response.status(), 0);
    assert!(outcome.response.message().contains("network unreachable"));
}

#[tokio::test]
async fn test_dropdown_adds_flag_and_search() {
    let (transport, mut posts) = setup();
    transport.respond(
        Method::Get,
        "/posts",
        ApiResponse::ok(json!([{ "id": 1, "title": "Rust" }])),
    );

    posts.dropdown(Some("ru"), "dropdown").await.unwrap();
    assert_eq!(posts.len(), 1);

    let choices = posts.pluck("title", "id", None, Value::Null);
    assert_eq!(choices[0].text, json!("Rust"));
    assert_eq!(choices[0].value, json!(1));

    let request = transport.last_request().await.unwrap();
    assert_eq!(
        request.query.to_json(),
        json!({ "dropdown": true, "status": "visible", "q": "ru" })
    );
}

#[tokio::test]
async fn test_delete_from_primary_key() {
    let (transport, mut posts) = setup();
    posts.set_items(&json!([{ "id": 1 }, { "id": 2 }]));
    transport.respond(Method::Post, "/posts/2", ApiResponse::ok(json!({})));

    posts.delete_from_primary_key(&json!(2)).await.unwrap();
    assert_eq!(posts.len(), 1);
    let request = transport.last_request().await.unwrap();
    assert_eq!(request.spoofed_method(), Some("DELETE"));

    let err = posts.delete_from_primary_key(&json!(42)).await.unwrap_err();
    assert!(matches!(err, EntityError::Precondition { .. }));
}

#[tokio::test]
async fn test_delete_from_entity() {
    let (transport, mut posts) = setup();
    posts.set_items(&json!([{ "id": 1 }, { "title": "draft" }]));
    transport.respond(
        Method::Post,
        "/posts/1",
        ApiResponse::with_status(403, json!({ "message": "Forbidden" })),
    );

    let mut published = posts.at(0).into_owned();
    assert!(posts.delete_from_entity(&mut published).await.is_err());
    assert_eq!(posts.len(), 2);

    // Entities without a primary key are only dropped locally
    let mut draft = posts.at(1).into_owned();
    posts.delete_from_entity(&mut draft).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(transport.request_count().await, 1);
}

#[tokio::test]
async fn test_abort_and_reset() {
    let (transport, mut posts) = setup();
    posts.push(Entity::of::<Post>(transport.clone(), &json!({ "id": 1 })));
    posts.query_mut().query("x");

    posts.abort();
    assert_eq!(transport.abort_count(), 1);

    posts.reset();
    assert!(posts.is_empty());
    assert_eq!(posts.query().to_json(), json!({ "status": "visible" }));
}
