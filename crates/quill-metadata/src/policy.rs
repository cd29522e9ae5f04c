//! Header forwarding policy
//!
//! The policy is an ordered table of [`HeaderRule`]s. Each inbound header name
//! is put in canonical form and checked against the rules top to bottom; the
//! first rule that matches decides the metadata key, and headers no rule
//! matches are dropped. This table is the whole whitelist, so changes here
//! decide what crosses into the RPC layer.

use crate::error::{MetadataError, MetadataResult};
use serde::{Deserialize, Serialize};

/// Header forwarded verbatim, compared case-sensitively
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// CSRF token header forwarded verbatim, compared case-insensitively
pub const CSRF_TOKEN_HEADER: &str = "X-Phabricator-Csrf";

/// CORS header pattern
pub const CORS_HEADER_PREFIX: &str = "access-control-";

/// Prefix that tunnels arbitrary metadata keys through HTTP headers
pub const METADATA_HEADER_PREFIX: &str = "Grpc-Metadata-";

/// Prefix used when rendering trailer metadata back into HTTP headers
pub const METADATA_TRAILER_PREFIX: &str = "Grpc-Trailer-";

/// How a rule compares a header name against its pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "pattern", rename_all = "snake_case")]
pub enum HeaderMatch {
    /// Whole name, case-sensitive
    Exact(String),
    /// Whole name, ASCII case-insensitive
    ExactIgnoreCase(String),
    /// Leading part of the name, case-sensitive
    Prefix(String),
    /// Leading part of the name, ASCII case-insensitive
    PrefixIgnoreCase(String),
}

impl HeaderMatch {
    pub fn pattern(&self) -> &str {
        match self {
            HeaderMatch::Exact(p)
            | HeaderMatch::ExactIgnoreCase(p)
            | HeaderMatch::Prefix(p)
            | HeaderMatch::PrefixIgnoreCase(p) => p,
        }
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, HeaderMatch::Prefix(_) | HeaderMatch::PrefixIgnoreCase(_))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            HeaderMatch::Exact(p) => name == p,
            HeaderMatch::ExactIgnoreCase(p) => name.eq_ignore_ascii_case(p),
            HeaderMatch::Prefix(p) => name.starts_with(p.as_str()),
            HeaderMatch::PrefixIgnoreCase(p) => name
                .as_bytes()
                .get(..p.len())
                .map_or(false, |head| head.eq_ignore_ascii_case(p.as_bytes())),
        }
    }
}

/// What a matching rule does to the header name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTransform {
    /// Use the header name as the metadata key
    #[default]
    Verbatim,
    /// Remove the matched prefix from the header name
    StripPrefix,
}

/// One entry of the forwarding table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRule {
    pub matcher: HeaderMatch,
    #[serde(default)]
    pub transform: KeyTransform,
}

impl HeaderRule {
    pub fn new(matcher: HeaderMatch, transform: KeyTransform) -> Self {
        Self { matcher, transform }
    }

    /// Forward a header whose name equals `name` exactly
    pub fn exact(name: impl Into<String>) -> Self {
        Self::new(HeaderMatch::Exact(name.into()), KeyTransform::Verbatim)
    }

    /// Forward a header whose name equals `name` ignoring case
    pub fn exact_ignore_case(name: impl Into<String>) -> Self {
        Self::new(HeaderMatch::ExactIgnoreCase(name.into()), KeyTransform::Verbatim)
    }

    /// Forward headers starting with `prefix`, with the prefix removed
    pub fn strip_prefix(prefix: impl Into<String>) -> Self {
        Self::new(HeaderMatch::Prefix(prefix.into()), KeyTransform::StripPrefix)
    }

    /// Metadata key for `name`, or `None` if this rule does not match
    pub fn apply<'a>(&self, name: &'a str) -> Option<&'a str> {
        if !self.matcher.matches(name) {
            return None;
        }
        match self.transform {
            KeyTransform::Verbatim => Some(name),
            KeyTransform::StripPrefix => name.get(self.matcher.pattern().len()..),
        }
    }

    /// Case-insensitive, verbatim rule on the CORS pattern
    fn is_cors_rule(&self) -> bool {
        matches!(
            &self.matcher,
            HeaderMatch::ExactIgnoreCase(p) | HeaderMatch::PrefixIgnoreCase(p)
                if p.eq_ignore_ascii_case(CORS_HEADER_PREFIX)
        ) && self.transform == KeyTransform::Verbatim
    }

    fn validate(&self) -> MetadataResult<()> {
        if self.matcher.pattern().is_empty() {
            return Err(MetadataError::InvalidRule(
                "header rule pattern must not be empty".to_string(),
            ));
        }
        if self.transform == KeyTransform::StripPrefix && !self.matcher.is_prefix() {
            return Err(MetadataError::InvalidRule(format!(
                "strip_prefix requires a prefix match, got {:?}",
                self.matcher
            )));
        }
        Ok(())
    }
}

/// Metadata forwarding policy
///
/// The default table, in evaluation order:
///
/// | # | Match | Pattern | Key |
/// |---|-------|---------|-----|
/// | 1 | exact | `Authorization` | unchanged |
/// | 2 | exact, any case | `X-Phabricator-Csrf` | unchanged |
/// | 3 | exact, any case | `access-control-` | unchanged |
/// | 4 | prefix | `Grpc-Metadata-` | prefix removed |
///
/// Rule 3 only matches a header literally named `access-control-`. Use
/// [`MetadataPolicy::forward_cors_headers`] to forward every
/// `Access-Control-*` header instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataPolicy {
    rules: Vec<HeaderRule>,
    include_request_fields: bool,
}

impl MetadataPolicy {
    /// Create the gateway's standard policy
    pub fn new() -> Self {
        Self {
            rules: vec![
                HeaderRule::exact(AUTHORIZATION_HEADER),
                HeaderRule::exact_ignore_case(CSRF_TOKEN_HEADER),
                HeaderRule::exact_ignore_case(CORS_HEADER_PREFIX),
                HeaderRule::strip_prefix(METADATA_HEADER_PREFIX),
            ],
            include_request_fields: true,
        }
    }

    /// Create a policy that forwards no headers
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            include_request_fields: true,
        }
    }

    /// Append a rule, evaluated after the existing ones
    pub fn rule(mut self, rule: HeaderRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Forward every header starting with `access-control-` (any case).
    ///
    /// Replaces the exact-name CORS rule in place so evaluation order is kept.
    /// Appends the rule if the policy had none.
    pub fn forward_cors_headers(mut self) -> Self {
        let cors = HeaderRule::new(
            HeaderMatch::PrefixIgnoreCase(CORS_HEADER_PREFIX.to_string()),
            KeyTransform::Verbatim,
        );
        match self.rules.iter_mut().find(|r| r.is_cors_rule()) {
            Some(existing) => *existing = cors,
            None => self.rules.push(cors),
        }
        self
    }

    /// Set whether method, endpoint, host and user agent are added as metadata
    pub fn include_request_fields(mut self, include: bool) -> Self {
        self.include_request_fields = include;
        self
    }

    pub fn rules(&self) -> &[HeaderRule] {
        &self.rules
    }

    pub fn includes_request_fields(&self) -> bool {
        self.include_request_fields
    }

    /// Check every rule is well formed
    pub fn validate(&self) -> MetadataResult<()> {
        self.rules.iter().try_for_each(HeaderRule::validate)
    }

    /// Metadata key for a canonical header name, or `None` if it is dropped
    pub fn match_header<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.rules.iter().find_map(|rule| rule.apply(name))
    }
}

impl Default for MetadataPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical MIME form of a header name.
///
/// The first letter and any letter following a hyphen are upper-cased, the
/// rest lower-cased: `grpc-metadata-trace-id` becomes `Grpc-Metadata-Trace-Id`.
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}
