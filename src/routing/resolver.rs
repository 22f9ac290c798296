//! Route lookup inside a proxy's server configuration document.
//!
//! # Responsibilities
//! - Find the route whose `match[].host[]` lists a domain exactly
//! - Require a reverse-proxy handler on that route, either directly in
//!   `handle[]` or one level down in a `subroute` handler's `routes[].handle[]`
//! - Expose the reverse-proxy handlers of a route for reading and mutation
//!
//! # Design Decisions
//! - Host matching is exact (no wildcards, no case folding)
//! - First matching route wins; its index addresses the PATCH
//! - The document is treated as opaque JSON; unknown keys are preserved

use serde_json::Value;
use thiserror::Error;

pub const REVERSE_PROXY: &str = "reverse_proxy";
pub const SUBROUTE: &str = "subroute";

/// How many `subroute` levels are searched for reverse-proxy handlers.
const MAX_SUBROUTE_DEPTH: usize = 1;

/// Route resolution and mutation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("server '{0}' not found in proxy configuration")]
    ServerNotFound(String),

    #[error("no route matched domain '{domain}' on server '{server}'")]
    NoRouteMatched { server: String, domain: String },

    #[error("pin-first needs a reverse_proxy handler with exactly 2 upstreams")]
    UpstreamCount,

    #[error("no upstream dial address contains '{0}'")]
    TargetNotInUpstreams(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerKind {
    ReverseProxy,
    Subroute,
    Other,
}

fn handler_kind(handle: &Value) -> HandlerKind {
    match handle.get("handler").and_then(Value::as_str) {
        Some(REVERSE_PROXY) => HandlerKind::ReverseProxy,
        Some(SUBROUTE) => HandlerKind::Subroute,
        _ => HandlerKind::Other,
    }
}

/// Server names present in a `GET .../servers` document, in document order.
pub fn server_names(doc: &Value) -> Vec<String> {
    doc.as_object()
        .map(|servers| servers.keys().cloned().collect())
        .unwrap_or_default()
}

/// Locate the first route on `server` matching `domain` that proxies traffic.
pub fn find_route<'a>(doc: &'a Value, server: &str, domain: &str) -> Result<(usize, &'a Value), RouteError> {
    let routes = doc
        .get(server)
        .ok_or_else(|| RouteError::ServerNotFound(server.to_string()))?
        .get("routes")
        .and_then(Value::as_array);

    routes
        .into_iter()
        .flatten()
        .enumerate()
        .find(|(_, route)| matches_host(route, domain) && has_reverse_proxy(route))
        .ok_or_else(|| RouteError::NoRouteMatched {
            server: server.to_string(),
            domain: domain.to_string(),
        })
}

/// True when some `match[].host[]` entry equals `domain`.
pub fn matches_host(route: &Value, domain: &str) -> bool {
    route
        .get("match")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|m| m.get("host").and_then(Value::as_array))
        .flatten()
        .any(|host| host.as_str() == Some(domain))
}

pub fn has_reverse_proxy(route: &Value) -> bool {
    !reverse_proxy_handlers(route).is_empty()
}

/// Reverse-proxy handlers of a route, top-level first, then nested.
pub fn reverse_proxy_handlers(route: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    if let Some(handles) = route.get("handle") {
        collect(handles, 0, &mut out);
    }
    out
}

fn collect<'a>(handles: &'a Value, depth: usize, out: &mut Vec<&'a Value>) {
    for handle in handles.as_array().into_iter().flatten() {
        match handler_kind(handle) {
            HandlerKind::ReverseProxy => out.push(handle),
            HandlerKind::Subroute if depth < MAX_SUBROUTE_DEPTH => {
                let nested = handle.get("routes").and_then(Value::as_array);
                for route in nested.into_iter().flatten() {
                    if let Some(inner) = route.get("handle") {
                        collect(inner, depth + 1, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Mutable variant of [`reverse_proxy_handlers`], same order.
pub fn reverse_proxy_handlers_mut(route: &mut Value) -> Vec<&mut Value> {
    let mut out = Vec::new();
    if let Some(handles) = route.get_mut("handle") {
        collect_mut(handles, 0, &mut out);
    }
    out
}

fn collect_mut<'a>(handles: &'a mut Value, depth: usize, out: &mut Vec<&'a mut Value>) {
    let Some(list) = handles.as_array_mut() else {
        return;
    };
    for handle in list.iter_mut() {
        match handler_kind(handle) {
            HandlerKind::ReverseProxy => out.push(handle),
            HandlerKind::Subroute if depth < MAX_SUBROUTE_DEPTH => {
                if let Some(nested) = handle.get_mut("routes").and_then(Value::as_array_mut) {
                    for route in nested.iter_mut() {
                        if let Some(inner) = route.get_mut("handle") {
                            collect_mut(inner, depth + 1, out);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}
