//! Switch targets and the route rewrites that implement them.
//!
//! All functions take the matched route by reference and return a rewritten
//! copy, so the caller can compare old and new to detect a no-op.

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::routing::resolver::{reverse_proxy_handlers, reverse_proxy_handlers_mut, RouteError};

const PIN_FIRST_PREFIX: &str = "first_";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported switch target '{0}' (expected first_<node>, round_robin or ip_hash)")]
pub struct TargetError(pub String);

/// What a switch does to a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SwitchTarget {
    /// `first_<X>`: put the upstream whose dial contains X first, policy `first`.
    PinFirst(String),
    RoundRobin,
    IpHash,
}

impl SwitchTarget {
    /// Resolve a node-map value. Full targets are taken as is; a bare name
    /// `X` is a location and means `first_X`.
    pub fn from_mapping(raw: &str) -> Result<Self, TargetError> {
        let raw = raw.trim();
        if let Ok(target) = raw.parse() {
            return Ok(target);
        }
        let bare = !raw.is_empty()
            && !raw.starts_with(PIN_FIRST_PREFIX)
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if bare {
            Ok(SwitchTarget::PinFirst(raw.to_string()))
        } else {
            Err(TargetError(raw.to_string()))
        }
    }

    /// Value written to `load_balancing.selection_policy.policy`.
    pub fn policy_name(&self) -> &str {
        match self {
            SwitchTarget::PinFirst(_) => "first",
            SwitchTarget::RoundRobin => "round_robin",
            SwitchTarget::IpHash => "ip_hash",
        }
    }
}

impl FromStr for SwitchTarget {
    type Err = TargetError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "round_robin" => Ok(SwitchTarget::RoundRobin),
            "ip_hash" => Ok(SwitchTarget::IpHash),
            _ => match raw.strip_prefix(PIN_FIRST_PREFIX) {
                Some(node) if !node.is_empty() => Ok(SwitchTarget::PinFirst(node.to_string())),
                _ => Err(TargetError(raw.to_string())),
            },
        }
    }
}

impl fmt::Display for SwitchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchTarget::PinFirst(node) => write!(f, "{}{}", PIN_FIRST_PREFIX, node),
            other => f.write_str(other.policy_name()),
        }
    }
}

/// Rewrite `route` for `target`, returning the new route.
pub fn apply_target(route: &Value, target: &SwitchTarget) -> Result<Value, RouteError> {
    let mut updated = route.clone();
    match target {
        SwitchTarget::PinFirst(node) => pin_first(&mut updated, node)?,
        named => {
            for handler in reverse_proxy_handlers_mut(&mut updated) {
                set_selection_policy(handler, named.policy_name());
            }
        }
    }
    Ok(updated)
}

fn pin_first(route: &mut Value, node: &str) -> Result<(), RouteError> {
    let mut saw_pair = false;
    let mut touched = 0;

    for handler in reverse_proxy_handlers_mut(route) {
        let Some(upstreams) = handler.get_mut("upstreams").and_then(Value::as_array_mut) else {
            continue;
        };
        if upstreams.len() != 2 {
            continue;
        }
        saw_pair = true;

        let first_has = dial(&upstreams[0]).contains(node);
        let second_has = dial(&upstreams[1]).contains(node);
        if second_has && !first_has {
            upstreams.swap(0, 1);
        } else if !first_has {
            continue;
        }

        set_selection_policy(handler, "first");
        touched += 1;
    }

    match (touched, saw_pair) {
        (0, false) => Err(RouteError::UpstreamCount),
        (0, true) => Err(RouteError::TargetNotInUpstreams(node.to_string())),
        _ => Ok(()),
    }
}

fn dial(upstream: &Value) -> &str {
    upstream.get("dial").and_then(Value::as_str).unwrap_or_default()
}

fn set_selection_policy(handler: &mut Value, policy: &str) {
    let Some(handler) = handler.as_object_mut() else {
        return;
    };
    let lb = handler
        .entry("load_balancing")
        .or_insert_with(|| json!({}));
    if !lb.is_object() {
        *lb = json!({});
    }
    lb["selection_policy"] = json!({ "policy": policy });
}

/// What one reverse-proxy handler currently does, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSummary {
    pub policy: Option<String>,
    pub upstreams: Vec<String>,
}

pub fn describe_route(route: &Value) -> Vec<HandlerSummary> {
    reverse_proxy_handlers(route)
        .into_iter()
        .map(|handler| HandlerSummary {
            policy: handler
                .pointer("/load_balancing/selection_policy/policy")
                .and_then(Value::as_str)
                .map(String::from),
            upstreams: handler
                .get("upstreams")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(|u| dial(u).to_string())
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_upstream_route() -> Value {
        json!({
            "match": [{"host": ["db.example.com"]}],
            "handle": [{
                "handler": "reverse_proxy",
                "upstreams": [{"dial": "pg-dc1.internal:5432"}, {"dial": "pg-dc2.internal:5432"}],
                "load_balancing": {"selection_policy": {"policy": "round_robin"}}
            }],
            "terminal": true
        })
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!("first_dc2".parse::<SwitchTarget>(), Ok(SwitchTarget::PinFirst("dc2".into())));
        assert_eq!("round_robin".parse::<SwitchTarget>(), Ok(SwitchTarget::RoundRobin));
        assert_eq!("ip_hash".parse::<SwitchTarget>(), Ok(SwitchTarget::IpHash));
        assert!("first_".parse::<SwitchTarget>().is_err());
        assert!("least_conn".parse::<SwitchTarget>().is_err());
        assert_eq!(SwitchTarget::PinFirst("dc2".into()).to_string(), "first_dc2");
    }

    #[test]
    fn test_mapping_targets() {
        assert_eq!(SwitchTarget::from_mapping("dc2"), Ok(SwitchTarget::PinFirst("dc2".into())));
        assert_eq!(SwitchTarget::from_mapping("ip_hash"), Ok(SwitchTarget::IpHash));
        assert!(SwitchTarget::from_mapping("first_").is_err());
        assert!(SwitchTarget::from_mapping("dc 2").is_err());
        assert!(SwitchTarget::from_mapping("").is_err());
    }

    #[test]
    fn test_pin_first_swaps() {
        let route = two_upstream_route();
        let updated = apply_target(&route, &SwitchTarget::PinFirst("dc2".into())).unwrap();

        let handler = &updated["handle"][0];
        assert_eq!(handler["upstreams"][0]["dial"], "pg-dc2.internal:5432");
        assert_eq!(handler["upstreams"][1]["dial"], "pg-dc1.internal:5432");
        assert_eq!(handler["load_balancing"]["selection_policy"]["policy"], "first");
        assert_eq!(updated["terminal"], true);

        // Second application is a no-op
        let again = apply_target(&updated, &SwitchTarget::PinFirst("dc2".into())).unwrap();
        assert_eq!(again, updated);
    }

    #[test]
    fn test_pin_first_already_first_sets_policy() {
        let route = two_upstream_route();
        let updated = apply_target(&route, &SwitchTarget::PinFirst("dc1".into())).unwrap();
        assert_eq!(updated["handle"][0]["upstreams"], route["handle"][0]["upstreams"]);
        assert_eq!(updated["handle"][0]["load_balancing"]["selection_policy"]["policy"], "first");
    }

    #[test]
    fn test_pin_first_requirements() {
        let single = json!({"handle": [{"handler": "reverse_proxy", "upstreams": [{"dial": "a:1"}]}]});
        assert_eq!(
            apply_target(&single, &SwitchTarget::PinFirst("a".into())),
            Err(RouteError::UpstreamCount)
        );

        assert_eq!(
            apply_target(&two_upstream_route(), &SwitchTarget::PinFirst("dc9".into())),
            Err(RouteError::TargetNotInUpstreams("dc9".into()))
        );
    }

    #[test]
    fn test_named_policy_reaches_nested_handlers() {
        let route = json!({
            "match": [{"host": ["db.example.com"]}],
            "handle": [
                {"handler": "reverse_proxy", "upstreams": [{"dial": "a:1"}, {"dial": "b:1"}]},
                {"handler": "subroute", "routes": [
                    {"handle": [{"handler": "reverse_proxy", "upstreams": [{"dial": "c:1"}, {"dial": "d:1"}],
                                 "load_balancing": {"selection_policy": {"policy": "first"}, "retries": 2}}]}
                ]}
            ]
        });

        let updated = apply_target(&route, &SwitchTarget::RoundRobin).unwrap();
        let summaries = describe_route(&updated);
        assert_eq!(summaries.len(), 2);
        for summary in &summaries {
            assert_eq!(summary.policy.as_deref(), Some("round_robin"));
        }
        assert_eq!(summaries[0].upstreams, vec!["a:1", "b:1"]);
        assert_eq!(summaries[1].upstreams, vec!["c:1", "d:1"]);
        // Sibling load_balancing keys survive
        assert_eq!(updated["handle"][1]["routes"][0]["handle"][0]["load_balancing"]["retries"], 2);
    }

    #[test]
    fn test_named_policy_noop() {
        let route = two_upstream_route();
        assert_eq!(apply_target(&route, &SwitchTarget::RoundRobin).unwrap(), route);
    }
}
