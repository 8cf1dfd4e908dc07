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

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// An in-memory representation of a service config, usually provided to gRPC as
/// a JSON object.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub load_balancing_config: Vec<LbPolicyConfig>,
    pub method_config: Vec<MethodConfig>,
}

impl ServiceConfig {
    /// Builds the config which routes to each named cluster through a
    /// cluster manager, one CDS child per cluster.
    pub fn for_clusters<'a>(clusters: impl IntoIterator<Item = &'a str>) -> Self {
        let children = clusters
            .into_iter()
            .map(|name| {
                let child = ClusterManagerChild {
                    child_policy: vec![LbPolicyConfig::Cds {
                        cluster: name.to_string(),
                    }],
                };
                (name.to_string(), child)
            })
            .collect();
        Self {
            load_balancing_config: vec![LbPolicyConfig::XdsClusterManager { children }],
            method_config: Vec::new(),
        }
    }

    /// The clusters named by the cluster manager policy, in sorted order.
    pub fn cluster_names(&self) -> Vec<&str> {
        self.load_balancing_config
            .iter()
            .flat_map(|policy| match policy {
                LbPolicyConfig::XdsClusterManager { children } => {
                    children.keys().map(String::as_str).collect()
                }
                LbPolicyConfig::Cds { .. } => Vec::new(),
            })
            .collect()
    }

    /// Renders the config in its canonical JSON form.
    pub fn to_json(&self) -> String {
        // Serializing maps with string keys and plain structs cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A load balancing policy together with its configuration.  Serializes as a
/// single-entry object keyed by the policy name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LbPolicyConfig {
    #[serde(rename = "xds_cluster_manager_experimental")]
    XdsClusterManager {
        children: BTreeMap<String, ClusterManagerChild>,
    },
    #[serde(rename = "cds_experimental")]
    Cds { cluster: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterManagerChild {
    pub child_policy: Vec<LbPolicyConfig>,
}

/// Per-method settings.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodConfig {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_timeout"
    )]
    pub timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_ready: Option<bool>,
}

// Durations use the protobuf JSON mapping: seconds with an "s" suffix and
// only as many fractional digits as needed.
fn serialize_timeout<S: Serializer>(
    timeout: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match timeout {
        Some(timeout) => serializer.serialize_str(&format_duration(*timeout)),
        None => serializer.serialize_none(),
    }
}

fn format_duration(d: Duration) -> String {
    let nanos = d.subsec_nanos();
    if nanos == 0 {
        return format!("{}s", d.as_secs());
    }
    let frac = format!("{nanos:09}");
    format!("{}.{}s", d.as_secs(), frac.trim_end_matches('0'))
}
