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
use std::sync::Arc;

use parking_lot::Mutex;

use super::ResolverBuilder;

/// A registry to store and retrieve name resolvers.  Resolvers are indexed by
/// the URI scheme they are intended to handle.
///
/// There is no process-wide registry; each channel is constructed with the
/// registry it should consult.
#[derive(Default, Clone)]
pub struct ResolverRegistry {
    m: Arc<Mutex<HashMap<String, Arc<dyn ResolverBuilder>>>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<String> = self.m.lock().keys().cloned().collect();
        schemes.sort();
        f.debug_struct("ResolverRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

impl ResolverRegistry {
    /// Construct an empty name resolver registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name resolver into the registry. builder.scheme() will
    /// be used as the scheme registered with this builder. If multiple
    /// resolvers are registered with the same name, the one registered last
    /// will take effect. Schemes are stored lowercased.
    pub fn add_builder(&self, builder: impl ResolverBuilder + 'static) {
        let scheme = builder.scheme().to_ascii_lowercase();
        self.m.lock().insert(scheme, Arc::new(builder));
    }

    /// Returns the resolver builder registered for the given scheme, if any.
    ///
    /// The provided scheme is case-insensitive.
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
        self.m.lock().get(&scheme.to_ascii_lowercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::name_resolution::{Resolver, ResolverOptions, Target};

    struct NamedBuilder(&'static str);

    impl ResolverBuilder for NamedBuilder {
        fn build(&self, _target: &Target, _options: ResolverOptions) -> Box<dyn Resolver> {
            unimplemented!()
        }

        fn scheme(&self) -> &str {
            self.0
        }

        fn is_valid_uri(&self, _uri: &Target) -> bool {
            true
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ResolverRegistry::new();
        registry.add_builder(NamedBuilder("xds"));
        assert_eq!(registry.get("XDS").unwrap().scheme(), "xds");
        assert!(registry.get("dns").is_none());
    }

    #[test]
    fn registries_are_independent() {
        let first = ResolverRegistry::new();
        let second = ResolverRegistry::new();
        first.add_builder(NamedBuilder("xds"));
        assert!(first.get("xds").is_some());
        assert!(second.get("xds").is_none());
    }
}
