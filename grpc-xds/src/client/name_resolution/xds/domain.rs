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

//! Virtual host selection by domain.

use tracing::warn;

use crate::xds::resource::VirtualHost;

// Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchType {
    Exact,
    Suffix,
    Prefix,
    Universe,
    Invalid,
}

fn match_type(pattern: &str) -> MatchType {
    let stars = pattern.matches('*').count();
    if pattern.is_empty() {
        MatchType::Invalid
    } else if stars == 0 {
        MatchType::Exact
    } else if pattern == "*" {
        MatchType::Universe
    } else if stars > 1 {
        MatchType::Invalid
    } else if pattern.starts_with('*') {
        MatchType::Suffix
    } else if pattern.ends_with('*') {
        MatchType::Prefix
    } else {
        MatchType::Invalid
    }
}

fn domain_matches(match_type: MatchType, pattern: &str, domain: &str) -> bool {
    match match_type {
        MatchType::Exact => pattern == domain,
        MatchType::Suffix => domain.ends_with(&pattern[1..]),
        MatchType::Prefix => domain.starts_with(&pattern[..pattern.len() - 1]),
        MatchType::Universe => true,
        MatchType::Invalid => false,
    }
}

/// Returns the virtual host whose domains best match `domain`.
///
/// Exact matches beat suffix (`*foo`) matches, which beat prefix (`foo*`)
/// matches, which beat `*`.  Within a kind the longest pattern wins, and on a
/// tie the first one seen.
pub(crate) fn find_virtual_host<'a>(
    virtual_hosts: &'a [VirtualHost],
    domain: &str,
) -> Option<&'a VirtualHost> {
    let mut best: Option<&VirtualHost> = None;
    let mut best_type = MatchType::Invalid;
    let mut longest = 0;
    for virtual_host in virtual_hosts {
        for pattern in &virtual_host.domains {
            let match_type = match_type(pattern);
            if match_type == MatchType::Invalid {
                warn!(virtual_host = %virtual_host.name, pattern = %pattern, "invalid domain pattern");
                continue;
            }
            if match_type > best_type || (match_type == best_type && pattern.len() <= longest) {
                continue;
            }
            if domain_matches(match_type, pattern, domain) {
                best = Some(virtual_host);
                best_type = match_type;
                longest = pattern.len();
                if best_type == MatchType::Exact {
                    return best;
                }
            }
        }
    }
    best
}
