//! Notification routing.
//!
//! Routes are evaluated in order; a route with no matchers matches every
//! alert (see DESIGN.md). `continue_matching` decides whether evaluation
//! proceeds to the next route after a match.

use serde::{Deserialize, Serialize};

use crate::ids::Id;
use crate::metrics::types::Tags;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Id,
    pub matchers: Tags,
    pub channel_ids: Vec<Id>,
    pub continue_matching: bool,
}

impl Route {
    pub fn matches(&self, labels: &Tags) -> bool {
        self.matchers.is_empty()
            || self
                .matchers
                .iter()
                .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// Walks `routes` in order, collecting channel ids from every matching route
/// until one without `continue_matching` is hit.
pub fn resolve_channels(routes: &[Route], labels: &Tags) -> Vec<Id> {
    let mut channels = Vec::new();
    for route in routes {
        if route.matches(labels) {
            channels.extend(route.channel_ids.iter().copied());
            if !route.continue_matching {
                break;
            }
        }
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(matchers: &[(&str, &str)], channel: Id, cont: bool) -> Route {
        Route {
            id: Id::new(),
            matchers: matchers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            channel_ids: vec![channel],
            continue_matching: cont,
        }
    }

    #[test]
    fn zero_matcher_route_matches_every_alert() {
        let ch = Id::new();
        let r = route(&[], ch, false);
        assert!(r.matches(&Tags::new()));
    }

    #[test]
    fn stops_at_first_non_continuing_match() {
        let a = Id::new();
        let b = Id::new();
        let routes = vec![route(&[("severity", "critical")], a, false), route(&[], b, false)];
        let mut labels = Tags::new();
        labels.insert("severity".into(), "critical".into());
        assert_eq!(resolve_channels(&routes, &labels), vec![a]);
    }
}
