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

use std::fmt::{Display, Formatter};

mod status_code;

pub use status_code::StatusCode;

/// Represents a gRPC status: the terminal outcome of a call, or the reason a
/// name resolution attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    message: String,
}

impl Status {
    /// Create a new `Status` with the given code and message.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Status {
            code,
            message: message.into(),
        }
    }

    /// Get the `StatusCode` of this `Status`.
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// Get the message of this `Status`.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Rewrites statuses that originate in the control plane so that codes which
/// are reserved for the application or the library itself are never surfaced
/// to callers, per [gRFC A54].
///
/// [gRFC A54]:
///     https://github.com/grpc/proposal/blob/master/A54-restrict-control-plane-status-codes.md
pub fn restrict_control_plane_status(status: Status) -> Status {
    match status.code {
        StatusCode::Ok
        | StatusCode::InvalidArgument
        | StatusCode::NotFound
        | StatusCode::AlreadyExists
        | StatusCode::FailedPrecondition
        | StatusCode::Aborted
        | StatusCode::OutOfRange
        | StatusCode::DataLoss => Status::new(
            StatusCode::Internal,
            format!(
                "Invalid status from control plane: {:?}: {}",
                status.code, status.message
            ),
        ),
        _ => status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_new() {
        let status = Status::new(StatusCode::Unavailable, "no route");
        assert_eq!(status.code(), StatusCode::Unavailable);
        assert_eq!(status.message(), "no route");
    }

    #[test]
    fn test_status_display() {
        let status = Status::new(StatusCode::DeadlineExceeded, "Deadline exceeded");
        assert_eq!(status.to_string(), "DeadlineExceeded: Deadline exceeded");
    }

    #[test]
    fn test_restrict_control_plane_status() {
        let restricted = restrict_control_plane_status(Status::new(StatusCode::NotFound, "gone"));
        assert_eq!(restricted.code(), StatusCode::Internal);
        assert_eq!(
            restricted.message(),
            "Invalid status from control plane: NotFound: gone"
        );

        let passed = restrict_control_plane_status(Status::new(StatusCode::Unavailable, "down"));
        assert_eq!(passed, Status::new(StatusCode::Unavailable, "down"));
    }
}
