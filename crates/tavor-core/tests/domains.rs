//! Domain management over HTTP.

mod common;

use common::*;
use serde_json::{json, Value};
use tavor_core::{CreateDomainRequest, DomainKind, DomainStatus, UpdateDomainRequest, UpdateField};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn domain() -> Value {
    json!({
        "id": "dom_123",
        "hostname": "app.deven.to",
        "slug": "app",
        "kind": "managed",
        "status": "active",
        "target_port": 4000,
        "box_id": "box_123",
        "verification_payload": {"cname": "app.deven.to"},
        "verification_errors": {},
        "inserted_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z"
    })
}

fn meta() -> Value {
    json!({"managed_suffix": "deven.to", "cname_target": "edge.deven.to"})
}

#[tokio::test]
async fn test_list_and_get_domains() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/domains"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [domain()],
            "meta": meta()
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/domains/dom_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": domain(),
            "meta": meta()
        })))
        .mount(&server)
        .await;

    let list = client.list_domains().await.unwrap();
    assert_eq!(list.data.len(), 1);
    assert_eq!(list.meta.managed_suffix, "deven.to");

    let one = client.get_domain("dom_123").await.unwrap();
    assert_eq!(one.data.id, "dom_123");
    assert_eq!(one.data.kind, DomainKind::Managed);
}

#[tokio::test]
async fn test_create_domain_omits_unset_fields() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/domains"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": domain(),
            "meta": meta()
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = CreateDomainRequest::managed("app").route_to("box_123", 4000);
    let resp = client.create_domain(&request).await.unwrap();
    assert_eq!(resp.data.status, DomainStatus::Active);

    let sent = json_body(&requests_to(&server, "/api/v2/domains").await[0]);
    assert_eq!(sent["kind"], "managed");
    assert_eq!(sent["slug"], "app");
    assert_eq!(sent["target_port"], 4000);
    assert_eq!(sent["box_id"], "box_123");
    assert!(sent.get("hostname").is_none());
}

#[tokio::test]
async fn test_update_domain_sends_explicit_nulls() {
    let (server, client) = setup().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/domains/dom_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": domain(),
            "meta": meta()
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = UpdateDomainRequest {
        status: UpdateField::Value(DomainStatus::Active),
        target_port: UpdateField::Null,
        box_id: UpdateField::Null,
    };
    client.update_domain("dom_123", &request).await.unwrap();

    let sent = json_body(&requests_to(&server, "/api/v2/domains/dom_123").await[0]);
    assert_eq!(
        sent,
        json!({"status": "active", "target_port": null, "box_id": null})
    );
}

#[tokio::test]
async fn test_delete_domain_accepts_no_content() {
    let (server, client) = setup().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v2/domains/dom_123"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.delete_domain("dom_123").await.unwrap();
}
