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

//! The per-call interface between the channel, the transport and
//! applications.

use std::fmt::{Debug, Formatter};
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tonic::metadata::MetadataMap;

use crate::status::Status;

mod deadline;
mod resolving;

#[cfg(test)]
pub(crate) mod test_utils;

pub use deadline::DeadlineTimer;
pub use resolving::{CallChannel, ConfigLookup, ResolvingCall};

/// Receives the results of a call.
pub trait CallListener: Send + Sync {
    fn on_receive_metadata(&self, metadata: MetadataMap);

    fn on_receive_message(&self, message: Bytes);

    /// Delivered exactly once, after every other event.
    fn on_receive_status(&self, status: Status);
}

/// One RPC.
///
/// Operations other than `start` and `cancel_with_status` must only be used
/// after `start`.
pub trait Call: Send + Sync {
    fn start(&self, metadata: MetadataMap, listener: Arc<dyn CallListener>);

    fn send_message_with_context(&self, context: MessageContext, message: Bytes);

    /// Requests the next message from the server.
    fn start_read(&self);

    fn half_close(&self);

    fn cancel_with_status(&self, status: Status);

    /// The address of the server the call is connected to, or an empty
    /// string if it is not connected.
    fn peer(&self) -> String;
}

/// Options accompanying an outgoing message.
#[derive(Default)]
pub struct MessageContext {
    /// Transport write flags.
    pub flags: Option<u32>,
    /// Invoked once the message has been handed to the transport.
    pub on_written: Option<Box<dyn FnOnce() + Send>>,
}

impl Debug for MessageContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("flags", &self.flags)
            .field("on_written", &self.on_written.is_some())
            .finish()
    }
}

/// Selects what a call inherits from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropagateFlags(u32);

impl PropagateFlags {
    pub const DEADLINE: Self = Self(1);
    pub const CENSUS_STATS_CONTEXT: Self = Self(2);
    pub const CENSUS_TRACING_CONTEXT: Self = Self(4);
    pub const CANCELLATION: Self = Self(8);
    pub const DEFAULTS: Self = Self(0xffff);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for PropagateFlags {
    fn default() -> Self {
        Self::DEFAULTS
    }
}

impl BitOr for PropagateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The server call a client call was made on behalf of.
pub trait ParentCall: Send + Sync {
    /// The parent's deadline, if it has one.
    fn deadline(&self) -> Option<Instant>;

    /// Registers `callback` to run when the parent is cancelled.
    fn on_cancelled(&self, callback: Box<dyn FnOnce() + Send>);
}

/// Per-call settings.
#[derive(Clone, Default)]
pub struct CallOptions {
    /// When the call must finish by; `None` means never.
    pub deadline: Option<Instant>,
    /// The `:authority` of the call.  Defaults to the channel's authority.
    pub host: Option<String>,
    /// Queue the call instead of failing it while name resolution is
    /// failing.
    pub wait_for_ready: bool,
    pub parent: Option<Arc<dyn ParentCall>>,
    pub propagate_flags: PropagateFlags,
}

impl Debug for CallOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOptions")
            .field("deadline", &self.deadline)
            .field("host", &self.host)
            .field("wait_for_ready", &self.wait_for_ready)
            .field("parent", &self.parent.is_some())
            .field("propagate_flags", &self.propagate_flags)
            .finish()
    }
}

/// Returns the earlier of two deadlines, where `None` is infinitely late.
pub(crate) fn min_deadline(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn propagate_flags() {
        assert!(PropagateFlags::DEFAULTS.contains(PropagateFlags::DEADLINE));
        assert!(PropagateFlags::DEFAULTS.contains(PropagateFlags::CANCELLATION));
        let flags = PropagateFlags::DEADLINE | PropagateFlags::CENSUS_STATS_CONTEXT;
        assert_eq!(flags.bits(), 3);
        assert!(!flags.contains(PropagateFlags::CANCELLATION));
        assert!(!PropagateFlags::empty().contains(PropagateFlags::DEADLINE));
    }

    #[test]
    fn earlier_deadline_wins() {
        let now = Instant::now();
        let later = now + Duration::from_secs(1);
        assert_eq!(min_deadline(Some(now), Some(later)), Some(now));
        assert_eq!(min_deadline(Some(later), None), Some(later));
        assert_eq!(min_deadline(None, Some(now)), Some(now));
        assert_eq!(min_deadline(None, None), None);
    }
}
