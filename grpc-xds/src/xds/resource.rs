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

//! Validated, in-memory forms of the xDS resources consumed by the resolver.
//!
//! Decoding and validating the wire representation of these resources is the
//! job of the xDS client; the types here only carry the fields that routing
//! needs.

use std::sync::Arc;
use std::time::Duration;

/// A Listener resource, as used by gRPC clients (an "API listener").
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub name: String,
    pub http_connection_manager: HttpConnectionManager,
}

/// The HTTP connection manager embedded in an API listener.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConnectionManager {
    /// Where to find the route table for this listener.
    pub route_specifier: RouteSpecifier,
    /// The default maximum stream duration applied to routes which do not
    /// configure their own.  A zero duration means no limit.
    pub max_stream_duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteSpecifier {
    /// The route table must be fetched separately, by name.
    Rds(String),
    /// The route table is embedded in the listener.
    Inline(Arc<RouteConfiguration>),
}

/// A routing table: an ordered list of virtual hosts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteConfiguration {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHost>,
}

/// A group of domain patterns sharing one ordered list of routes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VirtualHost {
    pub name: String,
    /// Each domain is either an exact host name, `*suffix`, `prefix*` or `*`.
    pub domains: Vec<String>,
    /// Routes in priority order; the first match wins.
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub route_match: RouteMatch,
    pub action: RouteAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub path: PathMatcher,
    /// Applies to prefix, exact path and regex matching.  Defaults to true.
    pub case_sensitive: bool,
    /// Every header matcher must pass.
    pub headers: Vec<HeaderMatcher>,
    /// When set, only this fraction of calls may match the route.
    pub runtime_fraction: Option<FractionalPercent>,
}

impl RouteMatch {
    /// A case-sensitive match on a path prefix, with no other constraints.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            path: PathMatcher::Prefix(prefix.into()),
            case_sensitive: true,
            headers: Vec::new(),
            runtime_fraction: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathMatcher {
    Prefix(String),
    /// Matches the full method name (e.g. `/pkg.Service/Method`).
    Path(String),
    /// A regular expression which must match the entire method name.
    SafeRegex(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMatcher {
    pub name: String,
    /// Negates the result of the matcher.
    pub invert_match: bool,
    pub specifier: HeaderMatchSpecifier,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderMatchSpecifier {
    Exact(String),
    /// A regular expression which must match the entire header value.
    SafeRegex(String),
    /// Matches values which parse as an integer in `[start, end)`.
    Range { start: i64, end: i64 },
    /// Matches if the header is present.
    Present,
    Prefix(String),
    Suffix(String),
}

/// A fraction expressed as `numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FractionalPercent {
    pub numerator: u32,
    pub denominator: DenominatorType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenominatorType {
    Hundred,
    TenThousand,
    Million,
}

impl DenominatorType {
    pub fn value(self) -> u32 {
        match self {
            DenominatorType::Hundred => 100,
            DenominatorType::TenThousand => 10_000,
            DenominatorType::Million => 1_000_000,
        }
    }
}

/// What to do with a call once its route has matched.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteAction {
    pub cluster_specifier: ClusterSpecifier,
    pub max_stream_duration: Option<MaxStreamDuration>,
}

impl RouteAction {
    /// An action that sends all matching calls to one cluster.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            cluster_specifier: ClusterSpecifier::Cluster(name.into()),
            max_stream_duration: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterSpecifier {
    Cluster(String),
    WeightedClusters(WeightedClusters),
    /// Routes by the value of a request header.  Not supported by gRPC
    /// clients; routes with this action are never matched.
    ClusterHeader(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedClusters {
    pub clusters: Vec<ClusterWeight>,
    pub total_weight: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterWeight {
    pub name: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaxStreamDuration {
    pub max_stream_duration: Option<Duration>,
    /// Caps the timeout a client may request; when set it is used as the
    /// route's timeout.
    pub grpc_timeout_header_max: Option<Duration>,
}
