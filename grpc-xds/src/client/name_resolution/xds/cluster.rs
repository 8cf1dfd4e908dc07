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

use crate::xds::resource::{ClusterSpecifier, WeightedClusters};

/// The total weight assumed when a weighted cluster list omits its total or
/// declares one that disagrees with its weights.
const DEFAULT_TOTAL_WEIGHT: u32 = 100;

/// Picks the cluster for a call that matched a route.
#[derive(Debug, Clone)]
pub(crate) enum ClusterSelector {
    Single(String),
    Weighted {
        /// Clusters paired with the running sum of weights up to and
        /// including them.
        cumulative: Vec<(String, u64)>,
        total: u64,
    },
}

impl ClusterSelector {
    /// Returns `None` for actions gRPC cannot route with, which causes the
    /// route to be skipped.
    pub(crate) fn new(specifier: &ClusterSpecifier) -> Option<Self> {
        match specifier {
            ClusterSpecifier::Cluster(name) => Some(Self::Single(name.clone())),
            ClusterSpecifier::WeightedClusters(weighted) => Self::weighted(weighted),
            ClusterSpecifier::ClusterHeader(_) => None,
        }
    }

    fn weighted(weighted: &WeightedClusters) -> Option<Self> {
        if weighted.clusters.is_empty() {
            return None;
        }
        let mut sum = 0u64;
        let cumulative = weighted
            .clusters
            .iter()
            .map(|c| {
                sum += u64::from(c.weight);
                (c.name.clone(), sum)
            })
            .collect();
        let total = match weighted.total_weight {
            Some(total) if u64::from(total) == sum => sum,
            _ => u64::from(DEFAULT_TOTAL_WEIGHT),
        };
        Some(Self::Weighted { cumulative, total })
    }

    /// Chooses a cluster.  Weighted selection draws a new random number on
    /// each call.
    pub(crate) fn select(&self) -> &str {
        match self {
            Self::Single(name) => name,
            Self::Weighted { cumulative, total } => {
                let draw = if *total == 0 {
                    0
                } else {
                    fastrand::u64(0..*total)
                };
                cumulative
                    .iter()
                    .find(|(_, bound)| draw < *bound)
                    .or(cumulative.last())
                    .map_or("", |(name, _)| name.as_str())
            }
        }
    }

    /// Every cluster this selector may return.
    pub(crate) fn cluster_names(&self) -> Vec<&str> {
        match self {
            Self::Single(name) => vec![name.as_str()],
            Self::Weighted { cumulative, .. } => {
                cumulative.iter().map(|(name, _)| name.as_str()).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::xds::resource::ClusterWeight;

    fn weighted(clusters: &[(&str, u32)], total_weight: Option<u32>) -> ClusterSpecifier {
        ClusterSpecifier::WeightedClusters(WeightedClusters {
            clusters: clusters
                .iter()
                .map(|(name, weight)| ClusterWeight {
                    name: name.to_string(),
                    weight: *weight,
                })
                .collect(),
            total_weight,
        })
    }

    fn draw_counts(selector: &ClusterSelector, trials: usize) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for _ in 0..trials {
            *counts.entry(selector.select().to_string()).or_default() += 1;
        }
        counts
    }

    #[test]
    fn single_cluster() {
        let selector = ClusterSelector::new(&ClusterSpecifier::Cluster("a".into())).unwrap();
        assert_eq!(selector.select(), "a");
        assert_eq!(selector.cluster_names(), vec!["a"]);
    }

    #[test]
    fn cluster_header_is_unsupported() {
        assert!(ClusterSelector::new(&ClusterSpecifier::ClusterHeader("x-cluster".into())).is_none());
    }

    #[test]
    fn empty_weighted_list_is_unsupported() {
        assert!(ClusterSelector::new(&weighted(&[], Some(0))).is_none());
    }

    #[test]
    fn weighted_split_converges() {
        let selector = ClusterSelector::new(&weighted(&[("A", 30), ("B", 70)], Some(100))).unwrap();
        let counts = draw_counts(&selector, 100_000);
        assert_eq!(counts.len(), 2);
        let a = counts["A"] as f64 / 100_000.0;
        assert!((0.27..0.33).contains(&a), "A fraction {a}");
        assert_eq!(counts["A"] + counts["B"], 100_000);
    }

    #[test]
    fn inconsistent_total_falls_back_to_default() {
        let selector = ClusterSelector::new(&weighted(&[("A", 30), ("B", 70)], Some(500))).unwrap();
        match &selector {
            ClusterSelector::Weighted { total, .. } => assert_eq!(*total, 100),
            ClusterSelector::Single(_) => panic!("expected weighted selector"),
        }
        let missing = ClusterSelector::new(&weighted(&[("A", 1), ("B", 1)], None)).unwrap();
        // Draws beyond the last bound land on the last cluster.
        let counts = draw_counts(&missing, 1_000);
        assert!(counts.keys().all(|k| k == "A" || k == "B"));
        assert!(counts["B"] > counts.get("A").copied().unwrap_or(0));
    }

    #[test]
    fn zero_weights() {
        let selector = ClusterSelector::new(&weighted(&[("A", 0), ("B", 0)], Some(0))).unwrap();
        assert_eq!(selector.select(), "B");
    }
}
