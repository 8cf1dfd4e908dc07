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

//! The interface to the xDS client which fetches and caches resources from the
//! control plane.

use std::sync::Arc;

use super::resource::{Listener, RouteConfiguration};

/// Trait for xDS resources that may be watched.
pub trait XdsResource: Send + Sync + std::fmt::Debug + 'static {
    /// The xDS type URL for this resource type.
    const TYPE_URL: &'static str;

    /// Returns the resource name.
    ///
    /// The resource name combined with the type URL uniquely identifies a resource.
    fn name(&self) -> &str;
}

impl XdsResource for Listener {
    const TYPE_URL: &'static str = "type.googleapis.com/envoy.config.listener.v3.Listener";

    fn name(&self) -> &str {
        &self.name
    }
}

impl XdsResource for RouteConfiguration {
    const TYPE_URL: &'static str =
        "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Receives events for a single watched resource.
///
/// Implementations must not block; the xDS client may invoke them from its own
/// worker.
pub trait ResourceWatcher<T: XdsResource>: Send + Sync {
    /// A new, validated version of the resource was received.
    fn on_resource_changed(&self, resource: Arc<T>);

    /// A non-fatal error occurred, e.g. the control plane connection failed.
    /// Any previously received version of the resource is still valid.
    fn on_error(&self, detail: String);

    /// The control plane indicated that the resource does not exist.
    fn on_resource_does_not_exist(&self);
}

/// The subset of an xDS client used by the name resolver.
///
/// Watches are keyed by (resource name, watcher).  Registering the same
/// watcher twice for one name, or cancelling a watch that is not registered,
/// has no effect.
pub trait XdsClient: Send + Sync {
    fn watch_listener(&self, name: &str, watcher: Arc<dyn ResourceWatcher<Listener>>);

    fn cancel_listener_watch(&self, name: &str, watcher: &Arc<dyn ResourceWatcher<Listener>>);

    fn watch_route_config(
        &self,
        name: &str,
        watcher: Arc<dyn ResourceWatcher<RouteConfiguration>>,
    );

    fn cancel_route_config_watch(
        &self,
        name: &str,
        watcher: &Arc<dyn ResourceWatcher<RouteConfiguration>>,
    );
}
