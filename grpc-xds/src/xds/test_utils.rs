/*
 *
 * Copyright 2025 gRPC authors.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to
 * deal in the Software without restriction, including without limitation the
 * rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
 * sell copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
 * IN THE SOFTWARE.
 *
 */

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::xds::client::{ResourceWatcher, XdsClient, XdsResource};
use crate::xds::resource::{
    HttpConnectionManager, Listener, Route, RouteAction, RouteConfiguration, RouteMatch,
    RouteSpecifier, VirtualHost,
};

pub(crate) enum WatchEvent {
    WatchListener(String),
    CancelListener(String),
    WatchRouteConfig(String),
    CancelRouteConfig(String),
}

impl Debug for WatchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WatchListener(name) => write!(f, "WatchListener({name})"),
            Self::CancelListener(name) => write!(f, "CancelListener({name})"),
            Self::WatchRouteConfig(name) => write!(f, "WatchRouteConfig({name})"),
            Self::CancelRouteConfig(name) => write!(f, "CancelRouteConfig({name})"),
        }
    }
}

type Watchers<T> = Mutex<HashMap<String, Vec<Arc<dyn ResourceWatcher<T>>>>>;

/// An in-memory xDS client.  Tests push resources, errors and "does not
/// exist" signals to whichever watchers are registered, and observe watch
/// registrations through `rx_events`.
pub(crate) struct FakeXdsClient {
    listeners: Watchers<Listener>,
    route_configs: Watchers<RouteConfiguration>,
    tx_events: mpsc::UnboundedSender<WatchEvent>,
}

impl FakeXdsClient {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<WatchEvent>) {
        let (tx_events, rx_events) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            listeners: Mutex::default(),
            route_configs: Mutex::default(),
            tx_events,
        });
        (client, rx_events)
    }

    pub(crate) fn send_listener(&self, listener: Listener) {
        let listener = Arc::new(listener);
        for watcher in snapshot(&self.listeners, &listener.name) {
            watcher.on_resource_changed(listener.clone());
        }
    }

    pub(crate) fn send_listener_error(&self, name: &str, detail: &str) {
        for watcher in snapshot(&self.listeners, name) {
            watcher.on_error(detail.to_string());
        }
    }

    pub(crate) fn send_listener_does_not_exist(&self, name: &str) {
        for watcher in snapshot(&self.listeners, name) {
            watcher.on_resource_does_not_exist();
        }
    }

    pub(crate) fn send_route_config(&self, route_config: RouteConfiguration) {
        let route_config = Arc::new(route_config);
        for watcher in snapshot(&self.route_configs, &route_config.name) {
            watcher.on_resource_changed(route_config.clone());
        }
    }

    pub(crate) fn send_route_config_error(&self, name: &str, detail: &str) {
        for watcher in snapshot(&self.route_configs, name) {
            watcher.on_error(detail.to_string());
        }
    }

    pub(crate) fn send_route_config_does_not_exist(&self, name: &str) {
        for watcher in snapshot(&self.route_configs, name) {
            watcher.on_resource_does_not_exist();
        }
    }

    pub(crate) fn listener_watch_count(&self, name: &str) -> usize {
        self.listeners.lock().get(name).map_or(0, Vec::len)
    }

    pub(crate) fn route_config_watch_count(&self, name: &str) -> usize {
        self.route_configs.lock().get(name).map_or(0, Vec::len)
    }
}

// Watchers are invoked without holding the lock so they may add or cancel
// watches.
fn snapshot<T: XdsResource>(watchers: &Watchers<T>, name: &str) -> Vec<Arc<dyn ResourceWatcher<T>>> {
    watchers.lock().get(name).cloned().unwrap_or_default()
}

fn add<T: XdsResource>(watchers: &Watchers<T>, name: &str, watcher: Arc<dyn ResourceWatcher<T>>) {
    let mut watchers = watchers.lock();
    let list = watchers.entry(name.to_string()).or_default();
    if !list.iter().any(|w| Arc::ptr_eq(w, &watcher)) {
        list.push(watcher);
    }
}

fn remove<T: XdsResource>(watchers: &Watchers<T>, name: &str, watcher: &Arc<dyn ResourceWatcher<T>>) {
    let mut watchers = watchers.lock();
    if let Some(list) = watchers.get_mut(name) {
        list.retain(|w| !Arc::ptr_eq(w, watcher));
        if list.is_empty() {
            watchers.remove(name);
        }
    }
}

impl XdsClient for FakeXdsClient {
    fn watch_listener(&self, name: &str, watcher: Arc<dyn ResourceWatcher<Listener>>) {
        add(&self.listeners, name, watcher);
        let _ = self.tx_events.send(WatchEvent::WatchListener(name.to_string()));
    }

    fn cancel_listener_watch(&self, name: &str, watcher: &Arc<dyn ResourceWatcher<Listener>>) {
        remove(&self.listeners, name, watcher);
        let _ = self.tx_events.send(WatchEvent::CancelListener(name.to_string()));
    }

    fn watch_route_config(
        &self,
        name: &str,
        watcher: Arc<dyn ResourceWatcher<RouteConfiguration>>,
    ) {
        add(&self.route_configs, name, watcher);
        let _ = self
            .tx_events
            .send(WatchEvent::WatchRouteConfig(name.to_string()));
    }

    fn cancel_route_config_watch(
        &self,
        name: &str,
        watcher: &Arc<dyn ResourceWatcher<RouteConfiguration>>,
    ) {
        remove(&self.route_configs, name, watcher);
        let _ = self
            .tx_events
            .send(WatchEvent::CancelRouteConfig(name.to_string()));
    }
}

/// A listener pointing at a separately fetched route table.
pub(crate) fn rds_listener(name: &str, route_config_name: &str) -> Listener {
    Listener {
        name: name.to_string(),
        http_connection_manager: HttpConnectionManager {
            route_specifier: RouteSpecifier::Rds(route_config_name.to_string()),
            max_stream_duration: None,
        },
    }
}

/// A listener with an embedded route table.
pub(crate) fn inline_listener(name: &str, route_config: RouteConfiguration) -> Listener {
    Listener {
        name: name.to_string(),
        http_connection_manager: HttpConnectionManager {
            route_specifier: RouteSpecifier::Inline(Arc::new(route_config)),
            max_stream_duration: None,
        },
    }
}

/// A listener with an embedded route table and a default stream duration.
pub(crate) fn inline_listener_with_timeout(
    name: &str,
    route_config: RouteConfiguration,
    max_stream_duration: Duration,
) -> Listener {
    let mut listener = inline_listener(name, route_config);
    listener.http_connection_manager.max_stream_duration = Some(max_stream_duration);
    listener
}

/// A route table with one virtual host whose routes send each prefix to a
/// cluster.
pub(crate) fn route_config(
    name: &str,
    domains: &[&str],
    routes: &[(&str, &str)],
) -> RouteConfiguration {
    RouteConfiguration {
        name: name.to_string(),
        virtual_hosts: vec![VirtualHost {
            name: "vhost".to_string(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            routes: routes
                .iter()
                .map(|(prefix, cluster)| Route {
                    route_match: RouteMatch::prefix(*prefix),
                    action: RouteAction::cluster(*cluster),
                })
                .collect(),
        }],
    }
}
