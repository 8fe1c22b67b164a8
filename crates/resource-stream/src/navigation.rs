//! # Navigation State
//!
//! Route parameters and query parameters as two `watch` channels. A
//! [`RouteController`] is held by whatever owns navigation (a router, a CLI
//! loop, a test); resources observe the matching [`Route`].

use std::collections::BTreeMap;
use tokio::sync::watch;

pub type Params = BTreeMap<String, String>;

/// Read side of the navigation state.
#[derive(Debug, Clone)]
pub struct Route {
    query: watch::Receiver<Params>,
    params: watch::Receiver<Params>,
}

/// Write side of the navigation state.
#[derive(Debug, Clone)]
pub struct RouteController {
    query: watch::Sender<Params>,
    params: watch::Sender<Params>,
}

/// Creates an empty route and its controller.
pub fn route() -> (RouteController, Route) {
    let (query_tx, query_rx) = watch::channel(Params::new());
    let (params_tx, params_rx) = watch::channel(Params::new());
    (
        RouteController {
            query: query_tx,
            params: params_tx,
        },
        Route {
            query: query_rx,
            params: params_rx,
        },
    )
}

impl Route {
    pub fn query(&self) -> Params {
        self.query.borrow().clone()
    }

    pub fn params(&self) -> Params {
        self.params.borrow().clone()
    }

    pub fn query_receiver(&self) -> watch::Receiver<Params> {
        self.query.clone()
    }

    pub fn params_receiver(&self) -> watch::Receiver<Params> {
        self.params.clone()
    }
}

impl RouteController {
    /// Replaces the query parameters. Observers are only woken on an actual change.
    pub fn set_query(&self, query: Params) {
        self.query.send_if_modified(|current| replace_if_changed(current, query));
    }

    pub fn set_params(&self, params: Params) {
        self.params.send_if_modified(|current| replace_if_changed(current, params));
    }

    pub fn set_query_param(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.query
            .send_if_modified(|current| insert_if_changed(current, key, value));
    }

    pub fn set_param(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.params
            .send_if_modified(|current| insert_if_changed(current, key, value));
    }

    pub fn remove_query_param(&self, key: &str) {
        self.query.send_if_modified(|current| current.remove(key).is_some());
    }

    /// A fresh [`Route`] observing this controller.
    pub fn route(&self) -> Route {
        Route {
            query: self.query.subscribe(),
            params: self.params.subscribe(),
        }
    }
}

fn replace_if_changed(current: &mut Params, next: Params) -> bool {
    if *current == next {
        return false;
    }
    *current = next;
    true
}

fn insert_if_changed(current: &mut Params, key: String, value: String) -> bool {
    if current.get(&key) == Some(&value) {
        return false;
    }
    current.insert(key, value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unchanged_values_do_not_notify() {
        let (controller, route) = route();
        let mut params = route.params_receiver();
        params.mark_unchanged();

        controller.set_param("id", "7");
        assert!(params.has_changed().unwrap());
        params.mark_unchanged();

        controller.set_param("id", "7");
        assert!(!params.has_changed().unwrap());
        assert_eq!(route.params().get("id").map(String::as_str), Some("7"));
    }

    #[tokio::test]
    async fn test_query_replace_and_remove() {
        let (controller, route) = route();
        controller.set_query(Params::from([("q".to_string(), "rust".to_string())]));
        controller.set_query_param("sort", "new");
        controller.remove_query_param("q");
        assert_eq!(
            route.query(),
            Params::from([("sort".to_string(), "new".to_string())])
        );
    }
}
