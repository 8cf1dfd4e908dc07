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

//! A call which waits for the channel's routing configuration before
//! binding to an inner call.

use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tonic::metadata::MetadataMap;
use tracing::{trace, warn};

use super::{
    Call, CallListener, CallOptions, DeadlineTimer, MessageContext, PropagateFlags, min_deadline,
};
use crate::client::config_selector::{CallConfig, OnCommitted};
use crate::rt::Runtime;
use crate::status::{Status, StatusCode, restrict_control_plane_status};

/// The result of asking the channel for a call's configuration.
#[derive(Debug)]
pub enum ConfigLookup {
    /// Name resolution has not produced a result yet.
    Pending,
    /// Name resolution failed.
    Unavailable(Status),
    /// The channel's config selector ran.
    Selected(Result<CallConfig, Status>),
}

/// What a [`ResolvingCall`] needs from its channel.
pub trait CallChannel: Send + Sync {
    fn get_config(&self, method: &str, metadata: &MetadataMap) -> ConfigLookup;

    /// Holds `call` until the channel's configuration changes, then calls
    /// [`ResolvingCall::get_config`] on it again.
    fn queue_call_for_config(&self, call: Arc<ResolvingCall>);

    /// Forgets a queued call which ended before its configuration arrived.
    fn remove_queued_call(&self, call_number: u64);

    fn create_inner_call(
        &self,
        config: &CallConfig,
        method: &str,
        host: &str,
        deadline: Option<Instant>,
    ) -> Arc<dyn Call>;

    fn runtime(&self) -> Arc<dyn Runtime>;
}

struct CallState {
    deadline: Option<Instant>,
    timer: DeadlineTimer,
    metadata: Option<MetadataMap>,
    listener: Option<Arc<dyn CallListener>>,
    // Operations made before the call was bound.
    pending_message: Option<(MessageContext, Bytes)>,
    pending_half_close: bool,
    read_pending: bool,
    // Set once a configuration has been accepted; the child is published
    // after buffered operations are replayed.
    bound: bool,
    child: Option<Arc<dyn Call>>,
    final_status: Option<Status>,
    status_watchers: Vec<Box<dyn FnOnce(&Status) + Send>>,
    on_committed: Option<OnCommitted>,
}

/// A [`Call`] created by the channel before the call's route is known.
///
/// Operations are buffered until the channel's config selector has chosen a
/// configuration, then replayed onto an inner call in the order read, message,
/// half-close.  The call ends exactly once; its status is delivered to the
/// listener on a later task.
pub struct ResolvingCall {
    channel: Arc<dyn CallChannel>,
    runtime: Arc<dyn Runtime>,
    method: String,
    host: String,
    call_number: u64,
    wait_for_ready: bool,
    this: Weak<ResolvingCall>,
    state: Mutex<CallState>,
}

impl std::fmt::Debug for ResolvingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvingCall")
            .field("method", &self.method)
            .field("call_number", &self.call_number)
            .finish_non_exhaustive()
    }
}

impl ResolvingCall {
    pub fn new(
        channel: Arc<dyn CallChannel>,
        method: impl Into<String>,
        host: impl Into<String>,
        options: CallOptions,
        call_number: u64,
    ) -> Arc<Self> {
        let runtime = channel.runtime();
        let mut deadline = options.deadline;
        let parent = options.parent.as_ref();
        if let Some(parent) = parent {
            if options.propagate_flags.contains(PropagateFlags::DEADLINE) {
                deadline = min_deadline(deadline, parent.deadline());
            }
        }
        let call = Arc::new_cyclic(|this| ResolvingCall {
            channel,
            runtime: runtime.clone(),
            method: method.into(),
            host: host.into(),
            call_number,
            wait_for_ready: options.wait_for_ready,
            this: this.clone(),
            state: Mutex::new(CallState {
                deadline,
                timer: DeadlineTimer::new(runtime),
                metadata: None,
                listener: None,
                pending_message: None,
                pending_half_close: false,
                read_pending: false,
                bound: false,
                child: None,
                final_status: None,
                status_watchers: Vec::new(),
                on_committed: None,
            }),
        });
        trace!(call_number, method = %call.method, ?deadline, "created resolving call");
        if let Some(parent) = parent {
            if options.propagate_flags.contains(PropagateFlags::CANCELLATION) {
                let this = call.this.clone();
                parent.on_cancelled(Box::new(move || {
                    if let Some(call) = this.upgrade() {
                        call.cancel_with_status(Status::new(
                            StatusCode::Cancelled,
                            "Cancelled by parent call",
                        ));
                    }
                }));
            }
        }
        call.run_deadline_timer();
        call
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn call_number(&self) -> u64 {
        self.call_number
    }

    pub fn wait_for_ready(&self) -> bool {
        self.wait_for_ready
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.state.lock().deadline
    }

    /// Whether the call has reached its final status.
    pub fn is_ended(&self) -> bool {
        self.state.lock().final_status.is_some()
    }

    /// Registers `watcher` to run synchronously when the call ends.  Runs it
    /// immediately if the call has already ended.
    pub fn add_status_watcher(&self, watcher: impl FnOnce(&Status) + Send + 'static) {
        let mut state = self.state.lock();
        match state.final_status.clone() {
            Some(status) => {
                drop(state);
                watcher(&status);
            }
            None => state.status_watchers.push(Box::new(watcher)),
        }
    }

    fn run_deadline_timer(&self) {
        let this = self.this.clone();
        let mut state = self.state.lock();
        let deadline = state.deadline;
        state.timer.arm(deadline, move || {
            if let Some(call) = this.upgrade() {
                call.cancel_with_status(Status::new(
                    StatusCode::DeadlineExceeded,
                    "Deadline exceeded",
                ));
            }
        });
    }

    /// Asks the channel for this call's configuration and acts on the
    /// answer.  Does nothing if the call has not started, is already bound or
    /// has ended.
    pub fn get_config(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let metadata = {
            let state = self.state.lock();
            if state.final_status.is_some() || state.bound {
                return;
            }
            match &state.metadata {
                Some(metadata) => metadata.clone(),
                None => return,
            }
        };
        match self.channel.get_config(&self.method, &metadata) {
            ConfigLookup::Pending => self.channel.queue_call_for_config(this),
            ConfigLookup::Unavailable(status) => {
                if self.wait_for_ready {
                    self.channel.queue_call_for_config(this);
                } else {
                    self.output_status(status);
                }
            }
            ConfigLookup::Selected(Err(status)) => {
                let status = Status::new(
                    status.code(),
                    format!("Failed to route call to method {}", self.method),
                );
                self.output_status(restrict_control_plane_status(status));
            }
            ConfigLookup::Selected(Ok(config)) => self.bind(config, metadata),
        }
    }

    fn bind(&self, mut config: CallConfig, metadata: MetadataMap) {
        let on_committed = config.on_committed.take();
        let timeout = config.method_config.timeout;
        let deadline = {
            let mut state = self.state.lock();
            if state.final_status.is_some() {
                return;
            }
            if state.bound {
                warn!(call_number = self.call_number, "call already bound; ignoring config");
                return;
            }
            state.bound = true;
            state.on_committed = on_committed;
            if let Some(timeout) = timeout {
                state.deadline = min_deadline(state.deadline, Some(Instant::now() + timeout));
            }
            state.deadline
        };
        if timeout.is_some() {
            self.run_deadline_timer();
        }
        trace!(
            call_number = self.call_number,
            cluster = ?config.cluster,
            ?deadline,
            "binding call"
        );

        let child = self
            .channel
            .create_inner_call(&config, &self.method, &self.host, deadline);
        child.start(
            metadata,
            Arc::new(ForwardingListener {
                call: self.this.clone(),
            }),
        );
        // Operations may arrive while earlier ones are replayed; the child is
        // only published once the buffer is empty.
        loop {
            let (read, message, half_close) = {
                let mut state = self.state.lock();
                if let Some(status) = state.final_status.clone() {
                    drop(state);
                    child.cancel_with_status(status);
                    return;
                }
                let read = std::mem::take(&mut state.read_pending);
                let message = state.pending_message.take();
                let half_close = std::mem::take(&mut state.pending_half_close);
                if !read && message.is_none() && !half_close {
                    state.child = Some(child);
                    return;
                }
                (read, message, half_close)
            };
            if read {
                child.start_read();
            }
            if let Some((context, message)) = message {
                child.send_message_with_context(context, message);
            }
            if half_close {
                child.half_close();
            }
        }
    }

    /// Ends the call with `status` unless it has already ended.
    fn output_status(&self, status: Status) {
        let (listener, watchers, on_committed) = {
            let mut state = self.state.lock();
            if state.final_status.is_some() {
                return;
            }
            state.final_status = Some(status.clone());
            state.timer.clear();
            state.pending_message = None;
            (
                state.listener.clone(),
                std::mem::take(&mut state.status_watchers),
                state.on_committed.take(),
            )
        };
        trace!(call_number = self.call_number, %status, "call ended");
        self.channel.remove_queued_call(self.call_number);
        for watcher in watchers {
            watcher(&status);
        }
        if let Some(on_committed) = on_committed {
            on_committed.commit();
        }
        if let Some(listener) = listener {
            self.deliver_status(listener, status);
        }
    }

    fn deliver_status(&self, listener: Arc<dyn CallListener>, status: Status) {
        self.runtime.spawn(Box::pin(async move {
            listener.on_receive_status(status);
        }));
    }

    /// The listener, if the call is still live.
    fn live_listener(&self) -> Option<Arc<dyn CallListener>> {
        let state = self.state.lock();
        if state.final_status.is_some() {
            return None;
        }
        state.listener.clone()
    }
}

impl Call for ResolvingCall {
    fn start(&self, metadata: MetadataMap, listener: Arc<dyn CallListener>) {
        let ended = {
            let mut state = self.state.lock();
            if state.listener.is_some() {
                warn!(call_number = self.call_number, "call started twice");
                return;
            }
            state.listener = Some(listener.clone());
            state.metadata = Some(metadata);
            state.final_status.clone()
        };
        match ended {
            Some(status) => self.deliver_status(listener, status),
            None => self.get_config(),
        }
    }

    fn send_message_with_context(&self, context: MessageContext, message: Bytes) {
        let child = {
            let mut state = self.state.lock();
            if state.final_status.is_some() {
                return;
            }
            match state.child.clone() {
                Some(child) => child,
                None => {
                    if state.pending_message.is_some() {
                        warn!(
                            call_number = self.call_number,
                            "message sent before the previous one was accepted; replacing it"
                        );
                    }
                    state.pending_message = Some((context, message));
                    return;
                }
            }
        };
        child.send_message_with_context(context, message);
    }

    fn start_read(&self) {
        let child = {
            let mut state = self.state.lock();
            if state.final_status.is_some() {
                return;
            }
            match state.child.clone() {
                Some(child) => child,
                None => {
                    state.read_pending = true;
                    return;
                }
            }
        };
        child.start_read();
    }

    fn half_close(&self) {
        let child = {
            let mut state = self.state.lock();
            if state.final_status.is_some() {
                return;
            }
            match state.child.clone() {
                Some(child) => child,
                None => {
                    state.pending_half_close = true;
                    return;
                }
            }
        };
        child.half_close();
    }

    fn cancel_with_status(&self, status: Status) {
        let child = self.state.lock().child.clone();
        self.output_status(status.clone());
        if let Some(child) = child {
            child.cancel_with_status(status);
        }
    }

    fn peer(&self) -> String {
        let child = self.state.lock().child.clone();
        child.map(|child| child.peer()).unwrap_or_default()
    }
}

/// Passes the inner call's results up to the resolving call's listener.
struct ForwardingListener {
    call: Weak<ResolvingCall>,
}

impl CallListener for ForwardingListener {
    fn on_receive_metadata(&self, metadata: MetadataMap) {
        if let Some(listener) = self.call.upgrade().and_then(|c| c.live_listener()) {
            listener.on_receive_metadata(metadata);
        }
    }

    fn on_receive_message(&self, message: Bytes) {
        if let Some(listener) = self.call.upgrade().and_then(|c| c.live_listener()) {
            listener.on_receive_message(message);
        }
    }

    fn on_receive_status(&self, status: Status) {
        if let Some(call) = self.call.upgrade() {
            call.output_status(status);
        }
    }
}
