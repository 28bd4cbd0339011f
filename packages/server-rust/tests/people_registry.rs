//! End-to-end dispatch through the registry with the `people` directory.

use std::sync::Arc;

use http::StatusCode;
use osapi_core::{BasicToken, JsonConverter, ParamMap, RequestContext};
use osapi_server::sample::{PeopleService, Person};
use osapi_server::{DispatchRequest, HandlerRegistry, RegistryConfig, RegistryService};
use serde_json::json;
use tower::ServiceExt;

fn registry(config: RegistryConfig) -> HandlerRegistry {
    let people = Arc::new(PeopleService::with_people([
        Person::new("john", "John Doe"),
        Person::new("jane", "Jane Doe"),
        Person::new("george", "George Doe"),
    ]));
    HandlerRegistry::builder(config)
        .register(people.bundle())
        .unwrap()
        .build()
        .unwrap()
}

fn as_john() -> RequestContext {
    RequestContext::new(
        Arc::new(BasicToken {
            owner: Some("john".to_string()),
            viewer: Some("john".to_string()),
            app: None,
            container: None,
        }),
        Arc::new(JsonConverter),
    )
}

fn query(pairs: &[(&str, &str)]) -> ParamMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), vec![(*v).to_string()]))
        .collect()
}

#[tokio::test]
async fn rest_get_resolves_plural_user_ids() {
    let registry = registry(RegistryConfig::default());
    let value = registry
        .dispatch_rest(
            "/people/john,jane/@self",
            "get",
            &ParamMap::new(),
            None,
            RequestContext::default(),
        )
        .await
        .unwrap();
    assert_eq!(value["totalResults"], 2);
}

#[tokio::test]
async fn supported_fields_outranks_user_template() {
    let registry = registry(RegistryConfig::default());
    let value = registry
        .dispatch_rest(
            "/people/@supportedFields",
            "GET",
            &ParamMap::new(),
            None,
            RequestContext::default(),
        )
        .await
        .unwrap();
    assert_eq!(value, json!(["id", "displayName", "nickname"]));
}

#[tokio::test]
async fn create_over_rest_then_read_over_rpc() {
    let registry = registry(RegistryConfig::default());
    let created = registry
        .dispatch_rest(
            "/people/@me/@self",
            "POST",
            &ParamMap::new(),
            Some(r#"{"id": "ann", "displayName": "Ann Smith"}"#),
            as_john(),
        )
        .await
        .unwrap();
    assert_eq!(created["displayName"], "Ann Smith");

    let read = registry
        .dispatch_rpc(
            &json!({"method": "people.get", "params": {"userId": ["ann"], "groupId": "@self"}}),
            as_john(),
        )
        .await
        .unwrap();
    assert_eq!(read["list"][0]["id"], "ann");
}

#[tokio::test]
async fn rpc_update_reads_body_param_field() {
    let registry = registry(RegistryConfig::default());
    let updated = registry
        .dispatch_rpc(
            &json!({
                "method": "people.update",
                "params": {"userId": "@me", "person": {"id": "jane", "displayName": "Jane Roe"}}
            }),
            as_john(),
        )
        .await
        .unwrap();
    assert_eq!(updated["displayName"], "Jane Roe");
}

#[tokio::test]
async fn handler_declared_errors_keep_their_code() {
    let registry = registry(RegistryConfig::default());
    let err = registry
        .dispatch_rest("/people/@me/@self", "GET", &ParamMap::new(), None, RequestContext::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(StatusCode::UNAUTHORIZED));

    let err = registry
        .dispatch_rest(
            "/people/john/@self",
            "POST",
            &ParamMap::new(),
            Some(r#"{"id": "john", "displayName": "Again"}"#),
            as_john(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(StatusCode::CONFLICT));
}

#[tokio::test]
async fn paging_follows_config_defaults_and_clamp() {
    let registry = registry(RegistryConfig {
        default_count: 1,
        max_count: 2,
        ..RegistryConfig::default()
    });
    let defaulted = registry
        .dispatch_rest("/people/john/@all", "GET", &ParamMap::new(), None, as_john())
        .await
        .unwrap();
    assert_eq!(defaulted["list"].as_array().map(Vec::len), Some(1));

    let clamped = registry
        .dispatch_rest(
            "/people/john/@all",
            "GET",
            &query(&[("count", "50")]),
            None,
            as_john(),
        )
        .await
        .unwrap();
    assert_eq!(clamped["list"].as_array().map(Vec::len), Some(2));
    assert_eq!(clamped["totalResults"], 2);
}

#[tokio::test]
async fn malformed_count_is_bad_request() {
    let err = registry(RegistryConfig::default())
        .dispatch_rest(
            "/people/john/@self",
            "GET",
            &query(&[("count", "many")]),
            None,
            as_john(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(StatusCode::BAD_REQUEST));
}

#[tokio::test]
async fn batch_through_tower_service() {
    let service = RegistryService::new(Arc::new(registry(RegistryConfig::default())));
    let value = service
        .oneshot(DispatchRequest::Batch {
            envelope: json!({
                "mine": {"method": "people.get", "params": {"userId": "@me", "groupId": "@self"}},
                "gone": {"method": "people.delete", "params": {"userId": "nobody"}},
                "list": {"method": "system.listMethods"},
            }),
            ctx: as_john(),
        })
        .await
        .unwrap();
    assert_eq!(value["mine"]["data"]["list"][0]["id"], "john");
    assert_eq!(value["gone"]["error"]["code"], 404);
    let methods = value["list"]["data"].as_array().cloned().unwrap_or_default();
    for method in [
        "people.create",
        "people.delete",
        "people.get",
        "people.supportedFields",
        "people.update",
        "system.listMethods",
    ] {
        assert!(methods.contains(&json!(method)), "{method}");
    }
}

#[test]
fn enumeration_matches_registered_routes() {
    let registry = registry(RegistryConfig::default());
    let rest: Vec<String> = registry.supported_rest_services().into_iter().collect();
    assert_eq!(
        rest,
        vec![
            "DELETE /people/{userId}+/{groupId}/{personId}+",
            "GET /people/@supportedFields",
            "GET /people/{userId}+/{groupId}/{personId}+",
            "GET /system/listMethods",
            "POST /people/{userId}+/{groupId}/{personId}+",
            "PUT /people/{userId}+/{groupId}/{personId}+",
        ]
    );
}
