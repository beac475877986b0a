use url::Url;

use crate::error::Result;
use crate::input::{Attrs, Input};

/// The URL-and-attrs half of a fetcher scheme: everything that's pure data
/// transformation and doesn't need a store or the network, so it can live
/// behind a plain trait object in the registry. The store-touching half
/// (`getAccessor`, `clone`) is generic over `S: Store` instead — see
/// [`crate::fetch::fetch_to_accessor`] — since [`nixrs::store::Store`]'s
/// methods are themselves generic and so can't be boxed as `dyn Store`.
pub trait InputScheme: Send + Sync {
    /// The `type` attribute this scheme claims, e.g. `"github"`.
    fn scheme_type(&self) -> &'static str;

    /// `None` if `url`'s scheme isn't one this implementation recognises at
    /// all (as opposed to recognising it and rejecting the rest of it,
    /// which is an `Err`).
    fn input_from_url(&self, url: &Url, require_tree: bool) -> Result<Option<Input>>;

    fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>>;

    fn allowed_attrs(&self) -> &'static [&'static str];

    fn to_url(&self, input: &Input) -> Result<Url>;

    fn is_locked(&self, input: &Input) -> bool {
        input.has_narhash()
    }

    /// Applies command-line `--override-input`-style `ref`/`rev`
    /// overrides. The default rejects both, which is correct for schemes
    /// (like `path`) that have neither concept.
    fn apply_overrides(&self, input: &Input, reference: Option<&str>, rev: Option<&str>) -> Result<Input> {
        let _ = (reference, rev);
        Ok(input.clone())
    }

    /// The experimental feature flag gating this scheme, if any (`git` and
    /// the forges are stable; nothing currently needs this, but the seam
    /// exists for schemes that do).
    fn experimental_feature(&self) -> Option<&'static str> {
        None
    }
}

/// Holds every registered [`InputScheme`] and answers the attrs/URL-level
/// questions a flake reference needs answered before any fetch happens:
/// parsing, canonicalisation, override application. Constructed once at
/// startup via [`SchemeRegistry::with_default_schemes`] the way the spec's
/// "Global state" note asks — a builder step on an explicit handle, not a
/// static initialiser list.
pub struct SchemeRegistry {
    schemes: Vec<Box<dyn InputScheme>>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        SchemeRegistry { schemes: Vec::new() }
    }

    pub fn register(&mut self, scheme: Box<dyn InputScheme>) -> &mut Self {
        self.schemes.push(scheme);
        self
    }

    pub fn with_default_schemes() -> Self {
        let mut registry = Self::new();
        registry
            .register(Box::new(crate::schemes::path::PathScheme))
            .register(Box::new(crate::schemes::file::FileScheme))
            .register(Box::new(crate::schemes::tarball::TarballScheme))
            .register(Box::new(crate::schemes::git::GitScheme))
            .register(Box::new(crate::schemes::forge::ForgeScheme::github()))
            .register(Box::new(crate::schemes::forge::ForgeScheme::gitlab()))
            .register(Box::new(crate::schemes::forge::ForgeScheme::sourcehut()))
            .register(Box::new(crate::schemes::vcs_cli::VcsCliScheme::hg()))
            .register(Box::new(crate::schemes::vcs_cli::VcsCliScheme::fossil()))
            .register(Box::new(crate::schemes::vcs_cli::VcsCliScheme::pijul()));
        registry
    }

    pub fn by_type(&self, scheme_type: &str) -> Option<&dyn InputScheme> {
        self.schemes
            .iter()
            .find(|scheme| scheme.scheme_type() == scheme_type)
            .map(|scheme| scheme.as_ref())
    }

    pub fn input_from_url(&self, url: &Url, require_tree: bool) -> Result<Option<Input>> {
        for scheme in &self.schemes {
            if let Some(input) = scheme.input_from_url(url, require_tree)? {
                return Ok(Some(input));
            }
        }
        Ok(None)
    }

    pub fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>> {
        match attrs.get("type").and_then(|v| v.as_str()) {
            Some(scheme_type) => match self.by_type(scheme_type) {
                Some(scheme) => scheme.input_from_attrs(attrs),
                None => Err(crate::error::Error::UnsupportedScheme(scheme_type.to_string())),
            },
            None => Err(crate::error::Error::InvalidAttr(
                "type".to_string(),
                "missing".to_string(),
            )),
        }
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::with_default_schemes()
    }
}
