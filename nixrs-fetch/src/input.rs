use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::Url;

/// One field of an [`Input`]'s attribute set. Flake references are loose
/// JSON-ish key/value bags (`rev`, `ref`, `narHash`, `shallow`, ...), so the
/// value type has to cover the three shapes that actually appear rather
/// than committing to `serde_json::Value` wholesale.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    String(String),
    Bool(bool),
    Int(i64),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(s) => write!(f, "{s}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

pub type Attrs = BTreeMap<String, AttrValue>;

/// A reference to an external source: `{type = "github"; owner = ...; repo
/// = ...; rev = ...;}` or the `github:owner/repo/rev` URL it round-trips
/// through. `scheme` names the [`InputScheme`](crate::scheme::InputScheme)
/// that owns this input's `type` attribute; it is looked up afresh from
/// `attrs["type"]` rather than cached, since an `Input` is cheap data and
/// the scheme registry is the single source of truth for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Input {
    attrs: Attrs,
}

impl Input {
    pub fn new(attrs: Attrs) -> Self {
        Input { attrs }
    }

    pub fn scheme_type(&self) -> Option<&str> {
        self.attrs.get("type").and_then(AttrValue::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttrValue::as_str)
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    /// `rev`/`narHash` (whichever the scheme uses to pin content) is
    /// present, i.e. this input denotes exactly one immutable tree rather
    /// than a moving ref. Schemes override what counts via
    /// `InputScheme::is_locked`; this is the attrs-only fallback they
    /// delegate to when there's nothing scheme-specific to check.
    pub fn has_narhash(&self) -> bool {
        self.attrs.contains_key("narHash")
    }
}

/// `url.path()` is still percent-encoded (a `path:` input pointing at `a
/// b/flake.nix` arrives as `a%20b/flake.nix`); every scheme that pulls a
/// filesystem path out of a URL should go through this instead of
/// `url.path()` directly.
pub fn decode_url_path(url: &Url) -> String {
    percent_decode_str(url.path()).decode_utf8_lossy().into_owned()
}

/// Parses the subset of flake-reference URL syntax common to every scheme:
/// `<scheme>:<path-or-owner/repo>[?<query-attrs>]`. Scheme-specific parsing
/// (owner/repo splitting, `path`'s bare-filesystem-path shorthand) happens
/// in each `schemes::*` module; this only peels off the query string into
/// attrs so they don't all reimplement percent-decoding.
pub fn parse_query_attrs(url: &Url) -> Attrs {
    let mut attrs = Attrs::new();
    for (key, value) in url.query_pairs() {
        let value = if value == "1" || value == "true" {
            AttrValue::Bool(true)
        } else if value == "0" || value == "false" {
            AttrValue::Bool(false)
        } else if let Ok(i) = value.parse::<i64>() {
            AttrValue::Int(i)
        } else {
            AttrValue::String(value.into_owned())
        };
        attrs.insert(key.into_owned(), value);
    }
    attrs
}
