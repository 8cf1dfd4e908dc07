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

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tonic::metadata::MetadataMap;
use tracing::debug;

use super::call::{Call, CallChannel, CallOptions, ConfigLookup, ResolvingCall};
use super::config_selector::{CallConfig, ConfigSelector};
use super::name_resolution::{
    ChannelController, Resolver, ResolverOptions, ResolverRegistry, ResolverUpdate, Target,
    WorkScheduler,
};
use super::service_config::ServiceConfig;
use crate::rt::Runtime;
use crate::status::Status;

/// Errors constructing a [`Channel`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("no resolver registered for scheme {0:?}")]
    NoResolver(String),
    #[error("target {0} is not supported by its resolver")]
    UnsupportedTarget(String),
}

#[derive(Debug, Default, Clone)]
pub struct ChannelOptions {
    /// Overrides the data-plane authority chosen by the resolver.
    pub default_authority: Option<String>,
}

/// Creates the calls which carry RPCs once their configuration is known,
/// typically by picking a connection in the selected cluster.
pub trait InnerCallFactory: Send + Sync {
    fn create_call(
        &self,
        config: &CallConfig,
        method: &str,
        host: &str,
        deadline: Option<Instant>,
    ) -> Arc<dyn Call>;
}

/// A gRPC channel: a virtual connection to the service named by a target.
///
/// The channel runs the target's name resolver and routes each call using the
/// most recent configuration it produced.  Calls made before any configuration
/// is available wait for one.
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("target", &self.inner.target)
            .field("authority", &self.inner.authority)
            .finish()
    }
}

impl Channel {
    /// Constructs a new channel, starting name resolution for `target` with the
    /// resolver `registry` holds for its scheme.
    pub fn new(
        target: &str,
        options: ChannelOptions,
        registry: &ResolverRegistry,
        call_factory: Arc<dyn InnerCallFactory>,
        runtime: Arc<dyn Runtime>,
    ) -> Result<Self, ChannelError> {
        let parsed: Target = target.parse().map_err(|reason| ChannelError::InvalidTarget {
            target: target.to_string(),
            reason,
        })?;
        let builder = registry
            .get(parsed.scheme())
            .ok_or_else(|| ChannelError::NoResolver(parsed.scheme().to_string()))?;
        if !builder.is_valid_uri(&parsed) {
            return Err(ChannelError::UnsupportedTarget(parsed.to_string()));
        }
        let authority = options
            .default_authority
            .unwrap_or_else(|| builder.default_authority(&parsed));

        let inner = Arc::new(ChannelInner {
            target: parsed,
            authority,
            runtime,
            call_factory,
            resolver: Mutex::new(None),
            work_pending: AtomicBool::new(false),
            next_call_number: AtomicU64::new(0),
            state: Mutex::default(),
        });
        let work_scheduler = Arc::new(ChannelWorkScheduler {
            channel: Arc::downgrade(&inner),
        });
        let resolver = builder.build(
            &inner.target,
            ResolverOptions::new(
                inner.authority.clone(),
                inner.runtime.clone(),
                work_scheduler,
            ),
        );
        *inner.resolver.lock() = Some(resolver);
        // Work requested while the resolver was being built found no resolver.
        inner.schedule_work();
        debug!(target = %inner.target, authority = %inner.authority, "created channel");
        Ok(Self { inner })
    }

    /// Creates a call to `method`.  The call does nothing until started.
    pub fn create_call(&self, method: &str, options: CallOptions) -> Arc<ResolvingCall> {
        let host = options
            .host
            .clone()
            .unwrap_or_else(|| self.inner.authority.clone());
        let call_number = self.inner.next_call_number.fetch_add(1, Ordering::Relaxed);
        ResolvingCall::new(self.inner.clone(), method, host, options, call_number)
    }

    pub fn target(&self) -> &Target {
        &self.inner.target
    }

    pub fn authority(&self) -> &str {
        &self.inner.authority
    }

    /// The service config from the latest successful resolution.
    pub fn service_config(&self) -> Option<ServiceConfig> {
        self.inner.state.lock().service_config.clone()
    }

    #[cfg(test)]
    fn pending_call_count(&self) -> usize {
        self.inner.state.lock().pending_calls.len()
    }
}

#[derive(Default)]
struct ChannelState {
    config_selector: Option<Arc<dyn ConfigSelector>>,
    service_config: Option<ServiceConfig>,
    resolution_error: Option<Status>,
    pending_calls: Vec<Arc<ResolvingCall>>,
}

struct ChannelInner {
    target: Target,
    authority: String,
    runtime: Arc<dyn Runtime>,
    call_factory: Arc<dyn InnerCallFactory>,
    resolver: Mutex<Option<Box<dyn Resolver>>>,
    work_pending: AtomicBool,
    next_call_number: AtomicU64,
    state: Mutex<ChannelState>,
}

impl ChannelInner {
    fn schedule_work(self: &Arc<Self>) {
        if self.work_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let channel = self.clone();
        self.runtime.spawn(Box::pin(async move {
            channel.run_resolver_work();
        }));
    }

    fn run_resolver_work(&self) {
        let mut resolver = self.resolver.lock();
        // Cleared before running so that work requested from here on gets
        // another pass.
        self.work_pending.store(false, Ordering::Release);
        if let Some(resolver) = resolver.as_mut() {
            resolver.work(&mut ChannelControllerImpl { channel: self });
        }
    }

    fn apply_update(&self, update: ResolverUpdate) {
        let queued = {
            let mut state = self.state.lock();
            match update.service_config {
                Ok(service_config) => {
                    state.service_config = service_config;
                    state.config_selector = update.config_selector;
                    state.resolution_error = None;
                }
                Err(status) => {
                    debug!(target = %self.target, %status, "name resolution failed");
                    // A failure does not replace a working configuration.
                    if state.config_selector.is_none() {
                        state.resolution_error = Some(status);
                    }
                }
            }
            std::mem::take(&mut state.pending_calls)
        };
        for call in queued {
            call.get_config();
        }
    }
}

impl CallChannel for ChannelInner {
    fn get_config(&self, method: &str, metadata: &MetadataMap) -> ConfigLookup {
        let (selector, error) = {
            let state = self.state.lock();
            (
                state.config_selector.clone(),
                state.resolution_error.clone(),
            )
        };
        match (selector, error) {
            (Some(selector), _) => ConfigLookup::Selected(selector.select(method, metadata)),
            (None, Some(error)) => ConfigLookup::Unavailable(error),
            (None, None) => ConfigLookup::Pending,
        }
    }

    fn queue_call_for_config(&self, call: Arc<ResolvingCall>) {
        {
            let mut state = self.state.lock();
            if call.is_ended() {
                return;
            }
            // The configuration may have changed since the call looked it up.
            let redrive = state.config_selector.is_some()
                || (state.resolution_error.is_some() && !call.wait_for_ready());
            if !redrive {
                state.pending_calls.push(call);
                return;
            }
        }
        call.get_config();
    }

    fn remove_queued_call(&self, call_number: u64) {
        self.state
            .lock()
            .pending_calls
            .retain(|call| call.call_number() != call_number);
    }

    fn create_inner_call(
        &self,
        config: &CallConfig,
        method: &str,
        host: &str,
        deadline: Option<Instant>,
    ) -> Arc<dyn Call> {
        self.call_factory.create_call(config, method, host, deadline)
    }

    fn runtime(&self) -> Arc<dyn Runtime> {
        self.runtime.clone()
    }
}

struct ChannelWorkScheduler {
    channel: Weak<ChannelInner>,
}

impl WorkScheduler for ChannelWorkScheduler {
    fn schedule_work(&self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.schedule_work();
        }
    }
}

struct ChannelControllerImpl<'a> {
    channel: &'a ChannelInner,
}

impl ChannelController for ChannelControllerImpl<'_> {
    fn update(&mut self, update: ResolverUpdate) -> Result<(), String> {
        self.channel.apply_update(update);
        Ok(())
    }
}
