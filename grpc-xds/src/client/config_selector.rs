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

//! The per-call routing decision published by a resolver.

use std::fmt::{Debug, Formatter};

use tonic::metadata::MetadataMap;

use super::service_config::MethodConfig;
use crate::status::Status;

/// Chooses the configuration of each call made on a channel.
pub trait ConfigSelector: Send + Sync {
    /// Selects the configuration for a call to `method` carrying `metadata`.
    ///
    /// An `Err` is a permanent failure for this call; it is not retried.
    fn select(&self, method: &str, metadata: &MetadataMap) -> Result<CallConfig, Status>;
}

/// The configuration selected for one call.
#[derive(Debug, Default)]
pub struct CallConfig {
    pub method_config: MethodConfig,
    /// The cluster the call is routed to, if the selector routes by cluster.
    pub cluster: Option<String>,
    /// Must be committed once the call no longer needs the selected cluster.
    pub on_committed: Option<OnCommitted>,
}

/// A one-shot callback run when a call commits to its routing decision.
///
/// The callback runs exactly once: either on [`OnCommitted::commit`], or when
/// the value is dropped without being committed.
pub struct OnCommitted {
    f: Option<Box<dyn FnOnce() + Send>>,
}

impl OnCommitted {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            f: Some(Box::new(f)),
        }
    }

    pub fn commit(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

impl Drop for OnCommitted {
    fn drop(&mut self) {
        self.run();
    }
}

impl Debug for OnCommitted {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnCommitted")
            .field("pending", &self.f.is_some())
            .finish()
    }
}
