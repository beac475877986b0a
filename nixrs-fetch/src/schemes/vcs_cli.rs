use std::path::PathBuf;
use std::sync::Arc;

use nixrs::store::Store;
use nixrs::store_path::ContentAddressMethod;
use tokio::process::Command;
use url::Url;

use crate::accessor::{fetch_to_store, InputAccessor, PosixAccessor};
use crate::cache::cache_dir_for_url;
use crate::error::{Error, Result};
use crate::input::{Attrs, Input};
use crate::lock::LockedInput;
use crate::scheme::InputScheme;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vcs {
    Mercurial,
    Fossil,
    Pijul,
}

impl Vcs {
    fn scheme_type(self) -> &'static str {
        match self {
            Vcs::Mercurial => "hg",
            Vcs::Fossil => "fsl",
            Vcs::Pijul => "pijul",
        }
    }

    fn binary(self) -> &'static str {
        match self {
            Vcs::Mercurial => "hg",
            Vcs::Fossil => "fossil",
            Vcs::Pijul => "pijul",
        }
    }

    /// Clones (or, on a second call against an existing checkout,
    /// updates) `url` into `checkout`, leaving the working copy at `rev`
    /// when one was requested.
    fn checkout_args(self, url: &str, checkout: &std::path::Path, rev: Option<&str>) -> Vec<String> {
        match self {
            Vcs::Mercurial => {
                let mut args = vec!["clone".to_string(), url.to_string(), checkout.display().to_string()];
                if let Some(rev) = rev {
                    args.push("--updaterev".to_string());
                    args.push(rev.to_string());
                }
                args
            }
            Vcs::Fossil => vec![
                "clone".to_string(),
                url.to_string(),
                checkout.join("repo.fossil").display().to_string(),
            ],
            Vcs::Pijul => {
                let mut args = vec!["clone".to_string(), url.to_string(), checkout.display().to_string()];
                if let Some(rev) = rev {
                    args.push("--channel".to_string());
                    args.push(rev.to_string());
                }
                args
            }
        }
    }
}

pub struct VcsCliScheme {
    vcs: Vcs,
}

impl VcsCliScheme {
    pub fn hg() -> Self {
        VcsCliScheme { vcs: Vcs::Mercurial }
    }

    pub fn fossil() -> Self {
        VcsCliScheme { vcs: Vcs::Fossil }
    }

    pub fn pijul() -> Self {
        VcsCliScheme { vcs: Vcs::Pijul }
    }
}

impl InputScheme for VcsCliScheme {
    fn scheme_type(&self) -> &'static str {
        self.vcs.scheme_type()
    }

    fn input_from_url(&self, url: &Url, _require_tree: bool) -> Result<Option<Input>> {
        if url.scheme() != self.vcs.scheme_type() {
            return Ok(None);
        }
        let mut inner = url.clone();
        inner.set_scheme("https").ok();
        let mut attrs = Attrs::new();
        attrs.insert("type".to_string(), self.vcs.scheme_type().into());
        attrs.insert("url".to_string(), inner.as_str().into());
        if let Some(fragment) = url.fragment() {
            attrs.insert("rev".to_string(), fragment.to_string().into());
        }
        Ok(Some(Input::new(attrs)))
    }

    fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>> {
        if attrs.get("url").and_then(|v| v.as_str()).is_none() {
            return Err(Error::InvalidAttr(
                "url".to_string(),
                format!("required for the '{}' scheme", self.vcs.scheme_type()),
            ));
        }
        Ok(Some(Input::new(attrs.clone())))
    }

    fn allowed_attrs(&self) -> &'static [&'static str] {
        &["type", "url", "rev", "narHash", "lastModified"]
    }

    fn to_url(&self, input: &Input) -> Result<Url> {
        let url = input
            .get_str("url")
            .ok_or_else(|| Error::InvalidAttr("url".to_string(), "missing".to_string()))?;
        let mut url = Url::parse(url).map_err(|e| Error::Custom(e.to_string()))?;
        url.set_scheme(self.vcs.scheme_type()).ok();
        Ok(url)
    }

    fn is_locked(&self, input: &Input) -> bool {
        input.get_str("rev").is_some()
    }
}

/// Shells out to the VCS's own CLI to populate a per-URL cached checkout,
/// then reads it back with a plain [`PosixAccessor`] — there is no Rust
/// library binding for any of these three in the dependency stack, so the
/// CLI itself is the integration point, exactly as the scheme table
/// prescribes.
pub async fn get_accessor<S: Store + Send>(
    vcs_name: &str,
    store: &mut S,
    input: &Input,
) -> Result<(Arc<dyn InputAccessor>, LockedInput)> {
    let vcs = match vcs_name {
        "hg" => Vcs::Mercurial,
        "fsl" => Vcs::Fossil,
        "pijul" => Vcs::Pijul,
        other => return Err(Error::UnsupportedScheme(other.to_string())),
    };
    let url = input
        .get_str("url")
        .ok_or_else(|| Error::InvalidAttr("url".to_string(), "missing".to_string()))?
        .to_string();
    let rev = input.get_str("rev").map(|s| s.to_string());
    let checkout: PathBuf = cache_dir_for_url(vcs.scheme_type(), &url);

    if !checkout.exists() {
        std::fs::create_dir_all(checkout.parent().unwrap_or(&checkout))?;
        let args = vcs.checkout_args(&url, &checkout, rev.as_deref());
        let status = Command::new(vcs.binary())
            .args(&args)
            .status()
            .await
            .map_err(|e| Error::Custom(format!("failed to run '{}': {e}", vcs.binary())))?;
        if !status.success() {
            return Err(Error::Network(url.clone(), format!("'{}' exited with {status}", vcs.binary())));
        }
    }

    let accessor = PosixAccessor::new(&checkout);
    let name = input.get_str("name").unwrap_or(vcs.scheme_type());
    let store_path = fetch_to_store(&accessor, "", store, name, ContentAddressMethod::Recursive).await?;

    let mut locked_attrs = input.attrs().clone();
    if let Some(rev) = rev {
        locked_attrs.insert("rev".to_string(), rev.into());
    }
    let locked = LockedInput::new(Input::new(locked_attrs), store_path);
    Ok((Arc::new(accessor), locked))
}
