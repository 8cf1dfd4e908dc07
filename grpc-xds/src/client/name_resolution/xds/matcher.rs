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

//! Compiles a route's match specification into a predicate over the method
//! name and request metadata.

use num_bigint::BigInt;
use regex::{Regex, RegexBuilder};
use tonic::metadata::MetadataMap;
use tracing::warn;

use crate::xds::resource::{
    FractionalPercent, HeaderMatchSpecifier, HeaderMatcher, PathMatcher, RouteMatch,
};

/// The value matched against `content-type` header rules.  gRPC never lets
/// applications set this header.
const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Compiles `pattern` so that it must match a whole input.  Invalid patterns
/// are logged and yield `None`, which never matches.
fn compile_regex(pattern: &str, case_insensitive: bool) -> Option<Regex> {
    match RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "ignoring invalid regex in route match");
            None
        }
    }
}

#[derive(Debug)]
enum PathPredicate {
    Prefix { prefix: String, case_sensitive: bool },
    Exact { path: String, case_sensitive: bool },
    Regex(Option<Regex>),
}

impl PathPredicate {
    fn new(path: &PathMatcher, case_sensitive: bool) -> Self {
        match path {
            PathMatcher::Prefix(prefix) => Self::Prefix {
                prefix: fold_case(prefix, case_sensitive),
                case_sensitive,
            },
            PathMatcher::Path(path) => Self::Exact {
                path: fold_case(path, case_sensitive),
                case_sensitive,
            },
            PathMatcher::SafeRegex(pattern) => Self::Regex(compile_regex(pattern, !case_sensitive)),
        }
    }

    fn matches(&self, method: &str) -> bool {
        match self {
            Self::Prefix {
                prefix,
                case_sensitive,
            } => fold_case(method, *case_sensitive).starts_with(prefix.as_str()),
            Self::Exact {
                path,
                case_sensitive,
            } => fold_case(method, *case_sensitive) == *path,
            Self::Regex(re) => re.as_ref().is_some_and(|re| re.is_match(method)),
        }
    }
}

fn fold_case(s: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        s.to_string()
    } else {
        s.to_lowercase()
    }
}

#[derive(Debug)]
enum ValuePredicate {
    Exact(String),
    Regex(Option<Regex>),
    Range { start: BigInt, end: BigInt },
    Present,
    Prefix(String),
    Suffix(String),
}

impl ValuePredicate {
    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(want) => value == want,
            Self::Regex(re) => re.as_ref().is_some_and(|re| re.is_match(value)),
            Self::Range { start, end } => parse_integer(value).is_some_and(|v| *start <= v && v < *end),
            Self::Present => true,
            Self::Prefix(prefix) => value.starts_with(prefix.as_str()),
            Self::Suffix(suffix) => value.ends_with(suffix.as_str()),
        }
    }
}

/// Parses values of the form `-?[0-9]+`, of any magnitude.
fn parse_integer(value: &str) -> Option<BigInt> {
    let digits = value.strip_prefix('-').unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

#[derive(Debug)]
struct HeaderPredicate {
    name: String,
    invert: bool,
    value: ValuePredicate,
}

impl HeaderPredicate {
    fn new(matcher: &HeaderMatcher) -> Self {
        let value = match &matcher.specifier {
            HeaderMatchSpecifier::Exact(v) => ValuePredicate::Exact(v.clone()),
            HeaderMatchSpecifier::SafeRegex(p) => ValuePredicate::Regex(compile_regex(p, false)),
            HeaderMatchSpecifier::Range { start, end } => ValuePredicate::Range {
                start: BigInt::from(*start),
                end: BigInt::from(*end),
            },
            HeaderMatchSpecifier::Present => ValuePredicate::Present,
            HeaderMatchSpecifier::Prefix(p) => ValuePredicate::Prefix(p.clone()),
            HeaderMatchSpecifier::Suffix(s) => ValuePredicate::Suffix(s.clone()),
        };
        Self {
            name: matcher.name.to_ascii_lowercase(),
            invert: matcher.invert_match,
            value,
        }
    }

    fn matches(&self, metadata: &MetadataMap) -> bool {
        // Binary headers are never matched, whether or not the rule is
        // inverted.
        if self.name.ends_with("-bin") {
            return false;
        }
        let matched = match self.lookup(metadata) {
            Some(value) => self.value.matches(&value),
            None => false,
        };
        matched != self.invert
    }

    /// All values of the header joined with `,`, or `None` if it is absent.
    fn lookup(&self, metadata: &MetadataMap) -> Option<String> {
        if self.name == "content-type" {
            return Some(GRPC_CONTENT_TYPE.to_string());
        }
        let values: Vec<&str> = metadata
            .get_all(self.name.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }
}

/// The compiled form of one route's [`RouteMatch`].
#[derive(Debug)]
pub(crate) struct RouteMatcher {
    path: PathPredicate,
    headers: Vec<HeaderPredicate>,
    fraction: Option<FractionalPercent>,
}

impl RouteMatcher {
    pub(crate) fn new(route_match: &RouteMatch) -> Self {
        Self {
            path: PathPredicate::new(&route_match.path, route_match.case_sensitive),
            headers: route_match.headers.iter().map(HeaderPredicate::new).collect(),
            fraction: route_match.runtime_fraction,
        }
    }

    /// Reports whether a call to `method` with `metadata` matches the route.
    ///
    /// Routes with a runtime fraction draw a new random number on every
    /// evaluation, so repeated calls with the same input may disagree.
    pub(crate) fn matches(&self, method: &str, metadata: &MetadataMap) -> bool {
        self.path.matches(method)
            && self.headers.iter().all(|h| h.matches(metadata))
            && self.fraction.is_none_or(|f| {
                fastrand::u32(0..f.denominator.value()) < f.numerator
            })
    }
}
