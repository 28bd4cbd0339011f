//! In-memory `people` service used by the CLI and the integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use osapi_core::{ProtocolError, RequestItem, SortOrder, TypedRequest};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::service::{HandlerResult, OperationSpec, Reply, ServiceBundle};

/// Special user id resolving to the token's viewer.
pub const ME: &str = "@me";
/// Group id selecting the users themselves rather than a group of theirs.
pub const SELF_GROUP: &str = "@self";

const SUPPORTED_FIELDS: [&str; 3] = ["id", "displayName", "nickname"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl Person {
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            nickname: None,
        }
    }
}

/// A flat people directory. Any group other than `@self` is treated as
/// "everyone except the requested users".
#[derive(Debug, Default)]
pub struct PeopleService {
    people: RwLock<BTreeMap<String, Person>>,
}

impl PeopleService {
    #[must_use]
    pub fn with_people(people: impl IntoIterator<Item = Person>) -> Self {
        Self {
            people: RwLock::new(people.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    /// The `people` bundle over one shared directory.
    #[must_use]
    pub fn bundle(self: Arc<Self>) -> ServiceBundle<Self> {
        ServiceBundle::singleton("people", self)
            .path_prefix("/{userId}+/{groupId}/{personId}+")
            .operation(OperationSpec::get("get"), Self::get)
            .typed_operation(OperationSpec::post("create").body_param("person"), Self::create)
            .typed_operation(OperationSpec::put("update").body_param("person"), Self::update)
            .operation(OperationSpec::delete("delete"), Self::delete)
            .unit_operation(
                OperationSpec::new("supportedFields", [Method::GET]).path("/@supportedFields"),
                Self::supported_fields,
            )
    }

    /// Pages through the selected people. Completes asynchronously.
    ///
    /// # Errors
    ///
    /// Fails with `401` when `@me` is used without a viewer, and with `400`
    /// on malformed paging parameters.
    pub fn get(&self, item: &RequestItem) -> HandlerResult {
        let users = resolve_users(item)?;
        let start = usize::try_from(item.start_index()?)?;
        let count = usize::try_from(item.count()?)?;
        let order = item.sort_order()?;
        let wanted = item.list_parameter("personId");
        let self_group = item.group_id().map_or(true, |g| g == SELF_GROUP);

        let mut selected: Vec<Person> = self
            .people
            .read()
            .values()
            .filter(|p| users.contains(&p.id) == self_group)
            .filter(|p| wanted.is_empty() || wanted.contains(&p.id))
            .cloned()
            .collect();
        if item.sort_by().as_deref() == Some("displayName") {
            selected.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        }
        if order == SortOrder::Descending {
            selected.reverse();
        }

        let total = selected.len();
        let page: Vec<Person> = selected.into_iter().skip(start).take(count).collect();
        Ok(Reply::deferred(async move {
            Ok(json!({
                "startIndex": start,
                "totalResults": total,
                "list": page,
            }))
        }))
    }

    /// # Errors
    ///
    /// Fails with `409` if the id is taken, `400` on a malformed body.
    pub fn create(&self, req: TypedRequest<'_, Person>) -> HandlerResult {
        let person = req.payload()?;
        let mut people = self.people.write();
        if people.contains_key(&person.id) {
            return Err(ProtocolError::new(
                StatusCode::CONFLICT,
                format!("Person {} already exists", person.id),
            )
            .into());
        }
        people.insert(person.id.clone(), person.clone());
        Reply::value(&person)
    }

    /// # Errors
    ///
    /// Fails with `404` for an unknown id, `400` on a malformed body.
    pub fn update(&self, req: TypedRequest<'_, Person>) -> HandlerResult {
        let person = req.payload()?;
        let mut people = self.people.write();
        match people.get_mut(&person.id) {
            Some(existing) => {
                *existing = person.clone();
                Reply::value(&person)
            }
            None => Err(not_found(&person.id).into()),
        }
    }

    /// Removes every user named by `userId`.
    ///
    /// # Errors
    ///
    /// Fails with `404` if any of them is unknown; nothing is removed then.
    pub fn delete(&self, item: &RequestItem) -> HandlerResult {
        let users = resolve_users(item)?;
        let mut people = self.people.write();
        if let Some(missing) = users.iter().find(|id| !people.contains_key(*id)) {
            return Err(not_found(missing).into());
        }
        for id in &users {
            people.remove(id);
        }
        Ok(Reply::empty())
    }

    /// # Errors
    ///
    /// Never fails.
    pub fn supported_fields(&self) -> HandlerResult {
        Reply::value(&SUPPORTED_FIELDS)
    }
}

fn not_found(id: &str) -> ProtocolError {
    ProtocolError::new(StatusCode::NOT_FOUND, format!("Person {id} not found"))
}

/// `userId` values with `@me` replaced by the viewer.
fn resolve_users(item: &RequestItem) -> Result<Vec<String>, ProtocolError> {
    let ids = item.user_ids();
    if ids.is_empty() {
        return Err(ProtocolError::bad_request("No userId specified"));
    }
    ids.into_iter()
        .map(|id| {
            if id == ME {
                item.token()
                    .viewer_id()
                    .map(str::to_string)
                    .ok_or_else(|| ProtocolError::new(StatusCode::UNAUTHORIZED, "No viewer for @me"))
            } else {
                Ok(id)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use osapi_core::{ParamMap, RequestContext};

    use super::*;

    fn directory() -> PeopleService {
        PeopleService::with_people([
            Person::new("john", "John Doe"),
            Person::new("jane", "Jane Doe"),
            Person::new("ann", "Ann Smith"),
        ])
    }

    fn rest_item(pairs: &[(&str, &str)]) -> RequestItem {
        let params: ParamMap = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), vec![(*v).to_string()]))
            .collect();
        RequestItem::rest("people", "get", params, RequestContext::default())
    }

    async fn resolved(result: HandlerResult) -> serde_json::Value {
        match result.unwrap() {
            Reply::Immediate(v) => v,
            Reply::Deferred(fut) => fut.await.unwrap(),
        }
    }

    #[tokio::test]
    async fn self_group_returns_named_users() {
        let value = resolved(directory().get(&rest_item(&[
            ("userId", "john,jane"),
            ("groupId", "@self"),
            ("sortBy", "displayName"),
        ])))
        .await;
        assert_eq!(value["totalResults"], 2);
        assert_eq!(value["list"][0]["displayName"], "Jane Doe");
    }

    #[tokio::test]
    async fn other_groups_exclude_named_users_and_page() {
        let value = resolved(directory().get(&rest_item(&[
            ("userId", "john"),
            ("groupId", "@friends"),
            ("count", "1"),
        ])))
        .await;
        assert_eq!(value["totalResults"], 2);
        assert_eq!(value["list"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn me_without_viewer_is_unauthorized() {
        let err = directory()
            .get(&rest_item(&[("userId", "@me")]))
            .unwrap_err();
        assert!(err
            .downcast_ref::<ProtocolError>()
            .is_some_and(|p| p.code() == StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn delete_is_all_or_nothing() {
        let people = directory();
        let err = people
            .delete(&rest_item(&[("userId", "john,ghost")]))
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
        assert_eq!(people.people.read().len(), 3);
    }
}
