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

use std::sync::Arc;
use std::time::Instant;

use crate::rt::{Runtime, TaskHandle};

/// A cancellable single-shot timer which runs an action at a deadline.
///
/// Arming the timer clears any previous arming.  The action always runs on a
/// spawned task, never inside `arm`, even when the deadline has passed.
pub struct DeadlineTimer {
    runtime: Arc<dyn Runtime>,
    task: Option<Box<dyn TaskHandle>>,
}

impl std::fmt::Debug for DeadlineTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineTimer")
            .field("armed", &self.task.is_some())
            .finish()
    }
}

impl DeadlineTimer {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self {
            runtime,
            task: None,
        }
    }

    /// Runs `on_expiry` at `deadline`.  A `None` deadline never expires and
    /// only clears the timer.
    pub fn arm(&mut self, deadline: Option<Instant>, on_expiry: impl FnOnce() + Send + 'static) {
        self.clear();
        let Some(deadline) = deadline else {
            return;
        };
        let delay = deadline.saturating_duration_since(Instant::now());
        let sleep = self.runtime.sleep(delay);
        self.task = Some(self.runtime.spawn(Box::pin(async move {
            sleep.await;
            on_expiry();
        })));
    }

    pub fn clear(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.clear();
    }
}
