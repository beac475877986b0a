use serde::Deserialize;
use tracing::warn;

use crate::input::{Attrs, Input};

/// One `from -> to` rewrite rule: `nixpkgs` resolving to a pinned GitHub
/// input, or an `exact` rule a flake's own `flake.nix` can't override.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryEntry {
    pub from: Attrs,
    pub to: Attrs,
    #[serde(default)]
    pub exact: bool,
    #[serde(flatten)]
    pub extra: Attrs,
}

/// A parsed flake registry file. Per the format's own versioning policy,
/// a version this reader doesn't recognise is a warning, not a parse
/// failure — an old client reading a registry with extra fields it
/// doesn't understand should still resolve the entries it does
/// understand.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub entries: Vec<RegistryEntry>,
}

const SUPPORTED_VERSION: u32 = 2;

impl Registry {
    /// Parses `contents` leniently: a malformed top-level document is
    /// still an error (there's nothing to recover), but an individual
    /// entry that doesn't parse, or an unexpected `version`, only produces
    /// a `tracing::warn!` and is otherwise skipped.
    pub fn parse(contents: &str) -> Result<Registry, serde_json::Error> {
        let raw: serde_json::Value = serde_json::from_str(contents)?;
        let version = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        if version != SUPPORTED_VERSION {
            warn!(version, expected = SUPPORTED_VERSION, "unexpected flake registry version");
        }

        let mut entries = Vec::new();
        if let Some(flakes) = raw.get("flakes").and_then(|v| v.as_array()) {
            for (index, entry) in flakes.iter().enumerate() {
                match serde_json::from_value::<RegistryEntry>(entry.clone()) {
                    Ok(entry) => entries.push(entry),
                    Err(err) => warn!(index, %err, "skipping unparseable flake registry entry"),
                }
            }
        }

        Ok(Registry { entries })
    }

    /// Looks up `from` against every non-exact entry (an `exact` entry
    /// only matches a lookup that already named it exactly, i.e. it never
    /// participates in prefix-style resolution) and returns the first
    /// match's `to` attrs.
    pub fn resolve(&self, from: &Input) -> Option<Input> {
        self.entries
            .iter()
            .find(|entry| attrs_match(&entry.from, from.attrs()))
            .map(|entry| Input::new(entry.to.clone()))
    }
}

fn attrs_match(pattern: &Attrs, candidate: &Attrs) -> bool {
    pattern.iter().all(|(key, value)| candidate.get(key) == Some(value))
}
