//! Route table mapping (method, path) pairs to canned responses

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, Method as HttpMethod};
use bytes::Bytes;
use serde_json::Value;

use crate::method::Method;

/// Snapshot of an incoming request handed to a route inspector.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: HttpMethod,
    /// Full request path, prefix included.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ReceivedRequest {
    /// Decode the request body as JSON.
    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }
}

/// Callback invoked with each matching request before the response is written.
pub type Inspector = Arc<dyn Fn(&ReceivedRequest) + Send + Sync>;

/// A registered route: static payload plus optional inspector.
///
/// Immutable after registration; replaced wholesale when the same
/// (method, path) pair is registered again.
#[derive(Clone)]
pub(crate) struct Route {
    pub payload: Value,
    pub inspector: Option<Inspector>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("payload", &self.payload)
            .field("inspector", &self.inspector.is_some())
            .finish()
    }
}

/// Routes keyed by full path, then method.
#[derive(Debug, Default)]
pub(crate) struct RouteTable {
    routes: HashMap<String, HashMap<Method, Route>>,
}

impl RouteTable {
    /// Insert a route, replacing any prior route for the same pair.
    pub fn insert(&mut self, method: Method, path: String, route: Route) {
        self.routes.entry(path).or_default().insert(method, route);
    }

    /// Resolve a request against the table: exact method first, then an
    /// `All` route on the same path.
    pub fn resolve(&self, method: &HttpMethod, path: &str) -> Option<&Route> {
        let methods = self.routes.get(path)?;
        if let Some(m) = Method::from_request(method) {
            if let Some(route) = methods.get(&m) {
                return Some(route);
            }
        }
        methods.get(&Method::All)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn route(payload: Value) -> Route {
        Route {
            payload,
            inspector: None,
        }
    }

    #[test]
    fn insert_replaces_existing_route() {
        let mut table = RouteTable::default();
        table.insert(Method::Get, "/users".to_string(), route(json!({"v": 1})));
        table.insert(Method::Get, "/users".to_string(), route(json!({"v": 2})));

        assert_eq!(table.len(), 1);
        let resolved = table.resolve(&HttpMethod::GET, "/users").unwrap();
        assert_eq!(resolved.payload, json!({"v": 2}));
    }

    #[test]
    fn specific_method_wins_over_all() {
        let mut table = RouteTable::default();
        table.insert(Method::All, "/users".to_string(), route(json!("any")));
        table.insert(Method::Get, "/users".to_string(), route(json!("get")));

        let get = table.resolve(&HttpMethod::GET, "/users").unwrap();
        assert_eq!(get.payload, json!("get"));

        let post = table.resolve(&HttpMethod::POST, "/users").unwrap();
        assert_eq!(post.payload, json!("any"));
    }

    #[test]
    fn all_matches_unsupported_verbs() {
        let mut table = RouteTable::default();
        table.insert(Method::All, "/ping".to_string(), route(json!("pong")));

        let resolved = table.resolve(&HttpMethod::PATCH, "/ping").unwrap();
        assert_eq!(resolved.payload, json!("pong"));
    }

    #[test]
    fn unmatched_path_and_method_resolve_to_none() {
        let mut table = RouteTable::default();
        table.insert(Method::Get, "/users".to_string(), route(json!(1)));

        assert!(table.resolve(&HttpMethod::POST, "/users").is_none());
        assert!(table.resolve(&HttpMethod::GET, "/missing").is_none());
    }

    #[test]
    fn body_json_decodes_request_body() {
        let received = ReceivedRequest {
            method: HttpMethod::POST,
            path: "/users".to_string(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{\"name\":\"alice\"}"),
        };

        assert_eq!(received.body_json().unwrap(), json!({"name": "alice"}));
    }
}
