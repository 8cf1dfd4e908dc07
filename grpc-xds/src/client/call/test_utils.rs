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

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tonic::metadata::MetadataMap;

use super::{Call, CallChannel, CallListener, ConfigLookup, MessageContext, ParentCall, ResolvingCall};
use crate::client::config_selector::CallConfig;
use crate::rt::{self, Runtime};
use crate::status::Status;

pub(crate) const TEST_PEER: &str = "10.0.0.1:443";

pub(crate) enum CallEvent {
    Start,
    StartRead,
    Message(Bytes),
    HalfClose,
    Cancel(Status),
}

impl Debug for CallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::StartRead => write!(f, "StartRead"),
            Self::Message(m) => write!(f, "Message({m:?})"),
            Self::HalfClose => write!(f, "HalfClose"),
            Self::Cancel(s) => write!(f, "Cancel({s})"),
        }
    }
}

/// An inner call which records the operations applied to it.  Tests drive
/// its responses through `listener()`.
pub(crate) struct RecordingCall {
    tx_events: mpsc::UnboundedSender<CallEvent>,
    listener: Mutex<Option<Arc<dyn CallListener>>>,
}

impl RecordingCall {
    pub(crate) fn new(tx_events: mpsc::UnboundedSender<CallEvent>) -> Arc<Self> {
        Arc::new(Self {
            tx_events,
            listener: Mutex::default(),
        })
    }

    pub(crate) fn listener(&self) -> Arc<dyn CallListener> {
        self.listener.lock().clone().unwrap()
    }
}

impl Call for RecordingCall {
    fn start(&self, _metadata: MetadataMap, listener: Arc<dyn CallListener>) {
        *self.listener.lock() = Some(listener);
        self.tx_events.send(CallEvent::Start).unwrap();
    }

    fn send_message_with_context(&self, context: MessageContext, message: Bytes) {
        self.tx_events.send(CallEvent::Message(message)).unwrap();
        if let Some(on_written) = context.on_written {
            on_written();
        }
    }

    fn start_read(&self) {
        self.tx_events.send(CallEvent::StartRead).unwrap();
    }

    fn half_close(&self) {
        self.tx_events.send(CallEvent::HalfClose).unwrap();
    }

    fn cancel_with_status(&self, status: Status) {
        self.tx_events.send(CallEvent::Cancel(status)).unwrap();
    }

    fn peer(&self) -> String {
        TEST_PEER.to_string()
    }
}

#[derive(Debug)]
pub(crate) enum ListenerEvent {
    Metadata(MetadataMap),
    Message(Bytes),
    Status(Status),
}

/// A call listener which forwards everything it receives to a channel.
pub(crate) struct RecordingListener {
    tx_events: mpsc::UnboundedSender<ListenerEvent>,
}

impl RecordingListener {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (tx_events, rx_events) = mpsc::unbounded_channel();
        (Arc::new(Self { tx_events }), rx_events)
    }
}

impl CallListener for RecordingListener {
    fn on_receive_metadata(&self, metadata: MetadataMap) {
        let _ = self.tx_events.send(ListenerEvent::Metadata(metadata));
    }

    fn on_receive_message(&self, message: Bytes) {
        let _ = self.tx_events.send(ListenerEvent::Message(message));
    }

    fn on_receive_status(&self, status: Status) {
        let _ = self.tx_events.send(ListenerEvent::Status(status));
    }
}

/// The channel side of a resolving call, with scripted config lookups.
pub(crate) struct FakeCallChannel {
    runtime: Arc<dyn Runtime>,
    lookups: Mutex<VecDeque<ConfigLookup>>,
    queued: Mutex<Vec<Arc<ResolvingCall>>>,
    inner_calls: Mutex<Vec<(Arc<RecordingCall>, Option<Instant>)>>,
    tx_events: mpsc::UnboundedSender<CallEvent>,
}

impl FakeCallChannel {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<CallEvent>) {
        let (tx_events, rx_events) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            runtime: rt::default_runtime(),
            lookups: Mutex::default(),
            queued: Mutex::default(),
            inner_calls: Mutex::default(),
            tx_events,
        });
        (channel, rx_events)
    }

    /// Queues the result of a future config lookup.  Lookups beyond those
    /// queued return [`ConfigLookup::Pending`].
    pub(crate) fn push_lookup(&self, lookup: ConfigLookup) {
        self.lookups.lock().push_back(lookup);
    }

    pub(crate) fn take_queued(&self) -> Vec<Arc<ResolvingCall>> {
        std::mem::take(&mut *self.queued.lock())
    }

    /// The most recently created inner call and the deadline it was given.
    pub(crate) fn inner_call(&self) -> (Arc<RecordingCall>, Option<Instant>) {
        self.inner_calls.lock().last().cloned().unwrap()
    }

    pub(crate) fn inner_call_count(&self) -> usize {
        self.inner_calls.lock().len()
    }
}

impl CallChannel for FakeCallChannel {
    fn get_config(&self, _method: &str, _metadata: &MetadataMap) -> ConfigLookup {
        self.lookups.lock().pop_front().unwrap_or(ConfigLookup::Pending)
    }

    fn queue_call_for_config(&self, call: Arc<ResolvingCall>) {
        self.queued.lock().push(call);
    }

    fn remove_queued_call(&self, call_number: u64) {
        self.queued
            .lock()
            .retain(|call| call.call_number() != call_number);
    }

    fn create_inner_call(
        &self,
        _config: &CallConfig,
        _method: &str,
        _host: &str,
        deadline: Option<Instant>,
    ) -> Arc<dyn Call> {
        let call = RecordingCall::new(self.tx_events.clone());
        self.inner_calls.lock().push((call.clone(), deadline));
        call
    }

    fn runtime(&self) -> Arc<dyn Runtime> {
        self.runtime.clone()
    }
}

/// A parent call whose cancellation is triggered by the test.
#[derive(Default)]
pub(crate) struct FakeParentCall {
    pub(crate) deadline: Option<Instant>,
    callbacks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl FakeParentCall {
    pub(crate) fn new(deadline: Option<Instant>) -> Arc<Self> {
        Arc::new(Self {
            deadline,
            callbacks: Mutex::default(),
        })
    }

    pub(crate) fn cancel(&self) {
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for callback in callbacks {
            callback();
        }
    }
}

impl ParentCall for FakeParentCall {
    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn on_cancelled(&self, callback: Box<dyn FnOnce() + Send>) {
        self.callbacks.lock().push(callback);
    }
}
