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

//! A name resolver for `xds:` targets.
//!
//! The resolver watches the target's Listener and, when the listener refers to
//! one, its RouteConfiguration.  Each route table it receives is compiled into
//! a [`ConfigSelector`] which routes calls to clusters, together with a service
//! config that lists every cluster a call may currently be using.

use std::collections::{BTreeSet, VecDeque};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tonic::metadata::MetadataMap;
use tracing::{debug, trace};

use super::{
    ChannelController, Resolver, ResolverBuilder, ResolverOptions, ResolverUpdate, Target,
    WorkScheduler,
};
use crate::client::config_selector::{CallConfig, ConfigSelector, OnCommitted};
use crate::client::service_config::{MethodConfig, ServiceConfig};
use crate::status::{Status, StatusCode};
use crate::xds::client::{ResourceWatcher, XdsClient};
use crate::xds::resource::{Listener, RouteAction, RouteConfiguration, RouteSpecifier};

mod cluster;
mod domain;
mod matcher;
mod refs;


use cluster::ClusterSelector;
use matcher::RouteMatcher;
use refs::ClusterRefTable;

/// The URI scheme handled by [`XdsResolverBuilder`].
pub const SCHEME: &str = "xds";

/// Reasons xDS name resolution can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("no matching route found")]
    NoMatchingVirtualHost,
    #[error("Listener {0} does not exist")]
    ListenerDoesNotExist(String),
    #[error("Route config {0} does not exist")]
    RouteConfigDoesNotExist(String),
    #[error("{0}")]
    Transient(String),
}

/// Builds [`XdsResolver`]s which share one xDS client.
pub struct XdsResolverBuilder {
    xds_client: Arc<dyn XdsClient>,
}

impl std::fmt::Debug for XdsResolverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XdsResolverBuilder").finish_non_exhaustive()
    }
}

impl XdsResolverBuilder {
    pub fn new(xds_client: Arc<dyn XdsClient>) -> Self {
        Self { xds_client }
    }
}

impl ResolverBuilder for XdsResolverBuilder {
    fn build(&self, target: &Target, options: ResolverOptions) -> Box<dyn Resolver> {
        Box::new(XdsResolver::new(
            target.clone(),
            options,
            self.xds_client.clone(),
        ))
    }

    fn scheme(&self) -> &str {
        SCHEME
    }

    fn is_valid_uri(&self, uri: &Target) -> bool {
        uri.scheme() == SCHEME && !uri.endpoint().is_empty()
    }
}

enum XdsEvent {
    ListenerChanged(Arc<Listener>),
    ListenerError(String),
    ListenerDoesNotExist,
    RouteConfigChanged(String, Arc<RouteConfiguration>),
    RouteConfigError(String, String),
    RouteConfigDoesNotExist(String),
    /// A cluster no longer in the route table lost its last reference.
    ClustersChanged,
}

/// State shared between the resolver, its watchers and the config selectors
/// it publishes.
struct Shared {
    events: Mutex<VecDeque<XdsEvent>>,
    refs: Mutex<ClusterRefTable>,
    work_scheduler: Arc<dyn WorkScheduler>,
}

impl Shared {
    fn push(&self, event: XdsEvent) {
        self.events.lock().push_back(event);
        self.work_scheduler.schedule_work();
    }
}

struct ListenerWatcher {
    shared: Arc<Shared>,
}

impl ResourceWatcher<Listener> for ListenerWatcher {
    fn on_resource_changed(&self, resource: Arc<Listener>) {
        self.shared.push(XdsEvent::ListenerChanged(resource));
    }

    fn on_error(&self, detail: String) {
        self.shared.push(XdsEvent::ListenerError(detail));
    }

    fn on_resource_does_not_exist(&self) {
        self.shared.push(XdsEvent::ListenerDoesNotExist);
    }
}

struct RouteConfigWatcher {
    name: String,
    shared: Arc<Shared>,
}

impl ResourceWatcher<RouteConfiguration> for RouteConfigWatcher {
    fn on_resource_changed(&self, resource: Arc<RouteConfiguration>) {
        self.shared
            .push(XdsEvent::RouteConfigChanged(self.name.clone(), resource));
    }

    fn on_error(&self, detail: String) {
        self.shared
            .push(XdsEvent::RouteConfigError(self.name.clone(), detail));
    }

    fn on_resource_does_not_exist(&self) {
        self.shared
            .push(XdsEvent::RouteConfigDoesNotExist(self.name.clone()));
    }
}

/// Resolves an `xds:` target by watching its Listener and RouteConfiguration.
pub struct XdsResolver {
    target: Target,
    /// The listener resource name, also the host name matched against
    /// virtual host domains.
    listener_name: String,
    xds_client: Arc<dyn XdsClient>,
    shared: Arc<Shared>,
    listener_watcher: Arc<dyn ResourceWatcher<Listener>>,
    route_config_watch: Option<(String, Arc<dyn ResourceWatcher<RouteConfiguration>>)>,
    latest_route_config: Option<Arc<RouteConfiguration>>,
    listener_max_stream_duration: Option<Duration>,
    has_reported_success: bool,
}

impl std::fmt::Debug for XdsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XdsResolver")
            .field("target", &self.target)
            .field(
                "route_config",
                &self.route_config_watch.as_ref().map(|(name, _)| name),
            )
            .finish_non_exhaustive()
    }
}

impl XdsResolver {
    fn new(target: Target, options: ResolverOptions, xds_client: Arc<dyn XdsClient>) -> Self {
        let listener_name = target.endpoint().to_string();
        let shared = Arc::new(Shared {
            events: Mutex::default(),
            refs: Mutex::default(),
            work_scheduler: options.work_scheduler,
        });
        let listener_watcher: Arc<dyn ResourceWatcher<Listener>> = Arc::new(ListenerWatcher {
            shared: shared.clone(),
        });
        debug!(target = %target, listener = %listener_name, "starting xDS resolver");
        xds_client.watch_listener(&listener_name, listener_watcher.clone());
        Self {
            target,
            listener_name,
            xds_client,
            shared,
            listener_watcher,
            route_config_watch: None,
            latest_route_config: None,
            listener_max_stream_duration: None,
            has_reported_success: false,
        }
    }

    fn handle_event(&mut self, event: XdsEvent, controller: &mut dyn ChannelController) {
        match event {
            XdsEvent::ListenerChanged(listener) => self.handle_listener(&listener, controller),
            XdsEvent::ListenerError(detail) => {
                debug!(listener = %self.listener_name, %detail, "listener watch error");
                self.report_transient_error(detail, controller);
            }
            XdsEvent::ListenerDoesNotExist => {
                self.cancel_route_config_watch();
                self.latest_route_config = None;
                self.report_error(
                    ResolutionError::ListenerDoesNotExist(self.listener_name.clone()),
                    controller,
                );
            }
            XdsEvent::RouteConfigChanged(name, route_config) => {
                if self.is_current_route_config(&name) {
                    self.apply_route_config(route_config, controller);
                }
            }
            XdsEvent::RouteConfigError(name, detail) => {
                if self.is_current_route_config(&name) {
                    debug!(route_config = %name, %detail, "route config watch error");
                    self.report_transient_error(detail, controller);
                }
            }
            XdsEvent::RouteConfigDoesNotExist(name) => {
                if self.is_current_route_config(&name) {
                    self.latest_route_config = None;
                    self.report_error(ResolutionError::RouteConfigDoesNotExist(name), controller);
                }
            }
            XdsEvent::ClustersChanged => {
                if let Some(route_config) = self.latest_route_config.clone() {
                    self.apply_route_config(route_config, controller);
                }
            }
        }
    }

    fn handle_listener(&mut self, listener: &Listener, controller: &mut dyn ChannelController) {
        let hcm = &listener.http_connection_manager;
        self.listener_max_stream_duration = hcm.max_stream_duration;
        match &hcm.route_specifier {
            RouteSpecifier::Rds(name) => {
                if self.is_current_route_config(name) {
                    // The listener's defaults may have changed.
                    if let Some(route_config) = self.latest_route_config.clone() {
                        self.apply_route_config(route_config, controller);
                    }
                    return;
                }
                self.cancel_route_config_watch();
                self.latest_route_config = None;
                debug!(listener = %self.listener_name, route_config = %name, "watching route config");
                let watcher: Arc<dyn ResourceWatcher<RouteConfiguration>> =
                    Arc::new(RouteConfigWatcher {
                        name: name.clone(),
                        shared: self.shared.clone(),
                    });
                self.xds_client.watch_route_config(name, watcher.clone());
                self.route_config_watch = Some((name.clone(), watcher));
            }
            RouteSpecifier::Inline(route_config) => {
                self.cancel_route_config_watch();
                self.apply_route_config(route_config.clone(), controller);
            }
        }
    }

    fn is_current_route_config(&self, name: &str) -> bool {
        self.route_config_watch
            .as_ref()
            .is_some_and(|(current, _)| current == name)
    }

    fn cancel_route_config_watch(&mut self) {
        if let Some((name, watcher)) = self.route_config_watch.take() {
            debug!(route_config = %name, "cancelling route config watch");
            self.xds_client.cancel_route_config_watch(&name, &watcher);
        }
    }

    /// Compiles `route_config`, reconciles the cluster references against it
    /// and publishes the result.
    fn apply_route_config(
        &mut self,
        route_config: Arc<RouteConfiguration>,
        controller: &mut dyn ChannelController,
    ) {
        self.latest_route_config = Some(route_config.clone());
        let Some(virtual_host) =
            domain::find_virtual_host(&route_config.virtual_hosts, &self.listener_name)
        else {
            self.report_error(ResolutionError::NoMatchingVirtualHost, controller);
            return;
        };

        let mut routes = Vec::with_capacity(virtual_host.routes.len());
        let mut clusters = BTreeSet::new();
        for route in &virtual_host.routes {
            let Some(selector) = ClusterSelector::new(&route.action.cluster_specifier) else {
                trace!(virtual_host = %virtual_host.name, "skipping route with unsupported action");
                continue;
            };
            clusters.extend(selector.cluster_names().into_iter().map(String::from));
            routes.push(CompiledRoute {
                matcher: RouteMatcher::new(&route.route_match),
                selector,
                timeout: route_timeout(&route.action, self.listener_max_stream_duration),
            });
        }
        trace!(virtual_host = %virtual_host.name, ?routes, "compiled routes");

        let service_config = {
            let mut refs = self.shared.refs.lock();
            refs.reconcile(&clusters);
            ServiceConfig::for_clusters(refs.cluster_names())
        };
        debug!(
            target = %self.target,
            clusters = ?service_config.cluster_names(),
            "publishing xDS config"
        );
        let selector = Arc::new(XdsConfigSelector {
            routes,
            shared: self.shared.clone(),
        });
        let _ = controller.update(ResolverUpdate::config(service_config, selector));
        self.has_reported_success = true;
    }

    fn report_transient_error(&mut self, detail: String, controller: &mut dyn ChannelController) {
        if !self.has_reported_success {
            self.report_error(ResolutionError::Transient(detail), controller);
        }
    }

    fn report_error(&mut self, error: ResolutionError, controller: &mut dyn ChannelController) {
        debug!(target = %self.target, %error, "xDS resolution failed");
        let status = Status::new(
            StatusCode::Unavailable,
            format!("xDS name resolution failed for target {}: {error}", self.target),
        );
        let _ = controller.update(ResolverUpdate::error(status));
    }
}

/// The timeout of calls on a route: the route's own limits if it has them,
/// else the listener default.  Zero means none.
fn route_timeout(action: &RouteAction, listener_default: Option<Duration>) -> Option<Duration> {
    let timeout = match &action.max_stream_duration {
        Some(msd) => msd
            .grpc_timeout_header_max
            .or(msd.max_stream_duration)
            .or(listener_default),
        None => listener_default,
    };
    timeout.filter(|t| !t.is_zero())
}

impl Resolver for XdsResolver {
    fn resolve_now(&mut self) {}

    fn work(&mut self, channel_controller: &mut dyn ChannelController) {
        let events: Vec<XdsEvent> = self.shared.events.lock().drain(..).collect();
        for event in events {
            self.handle_event(event, channel_controller);
        }
    }
}

impl Drop for XdsResolver {
    fn drop(&mut self) {
        self.cancel_route_config_watch();
        self.xds_client
            .cancel_listener_watch(&self.listener_name, &self.listener_watcher);
    }
}

struct CompiledRoute {
    matcher: RouteMatcher,
    selector: ClusterSelector,
    timeout: Option<Duration>,
}

impl Debug for CompiledRoute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("matcher", &self.matcher)
            .field("clusters", &self.selector.cluster_names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Routes calls using one compiled route table.
struct XdsConfigSelector {
    routes: Vec<CompiledRoute>,
    shared: Arc<Shared>,
}

impl ConfigSelector for XdsConfigSelector {
    fn select(&self, method: &str, metadata: &MetadataMap) -> Result<CallConfig, Status> {
        let Some(route) = self.routes.iter().find(|r| r.matcher.matches(method, metadata)) else {
            return Err(Status::new(
                StatusCode::Unavailable,
                format!("No matching route found for {method}"),
            ));
        };
        let cluster = route.selector.select().to_string();
        let counted = self.shared.refs.lock().add_ref(&cluster);
        if !counted {
            debug!(%cluster, "routing to a cluster with no reference entry");
        }
        let shared = self.shared.clone();
        let name = cluster.clone();
        let on_committed = OnCommitted::new(move || {
            if !counted {
                return;
            }
            let removed = shared.refs.lock().unref(&name);
            if removed {
                shared.push(XdsEvent::ClustersChanged);
            }
        });
        Ok(CallConfig {
            method_config: MethodConfig {
                timeout: route.timeout,
                wait_for_ready: None,
            },
            cluster: Some(cluster),
            on_committed: Some(on_committed),
        })
    }
}
