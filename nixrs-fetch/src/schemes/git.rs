use std::path::PathBuf;
use std::sync::Arc;

use git2::Repository;
use nixrs::store::Store;
use nixrs::store_path::ContentAddressMethod;
use url::Url;

use crate::accessor::{fetch_to_store, GitTreeAccessor, InputAccessor};
use crate::cache::cache_dir_for_url;
use crate::error::{Error, Result};
use crate::input::{parse_query_attrs, Attrs, Input};
use crate::lock::LockedInput;
use crate::scheme::InputScheme;

pub struct GitScheme;

impl InputScheme for GitScheme {
    fn scheme_type(&self) -> &'static str {
        "git"
    }

    fn input_from_url(&self, url: &Url, _require_tree: bool) -> Result<Option<Input>> {
        if url.scheme() != "git" && url.scheme() != "git+https" && url.scheme() != "git+ssh" {
            return Ok(None);
        }
        let mut attrs = parse_query_attrs(url);
        attrs.insert("type".to_string(), "git".into());
        let mut inner = url.clone();
        let stripped_scheme = url.scheme().trim_start_matches("git+").to_string();
        inner.set_scheme(&stripped_scheme).ok();
        if let Some(fragment) = url.fragment() {
            attrs.insert("ref".to_string(), fragment.to_string().into());
        }
        inner.set_fragment(None);
        attrs.insert("url".to_string(), inner.as_str().into());
        Ok(Some(Input::new(attrs)))
    }

    fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>> {
        if attrs.get("url").and_then(|v| v.as_str()).is_none() {
            return Err(Error::InvalidAttr(
                "url".to_string(),
                "required for the 'git' scheme".to_string(),
            ));
        }
        Ok(Some(Input::new(attrs.clone())))
    }

    fn allowed_attrs(&self) -> &'static [&'static str] {
        &["type", "url", "ref", "rev", "shallow", "submodules", "narHash", "lastModified"]
    }

    fn to_url(&self, input: &Input) -> Result<Url> {
        let url = input
            .get_str("url")
            .ok_or_else(|| Error::InvalidAttr("url".to_string(), "missing".to_string()))?;
        let mut url = Url::parse(url).map_err(|e| Error::Custom(e.to_string()))?;
        if let Some(reference) = input.get_str("ref") {
            url.set_fragment(Some(reference));
        }
        Ok(url)
    }

    fn is_locked(&self, input: &Input) -> bool {
        input.get_str("rev").is_some()
    }

    fn apply_overrides(&self, input: &Input, reference: Option<&str>, rev: Option<&str>) -> Result<Input> {
        let mut input = input.clone();
        if let Some(reference) = reference {
            input.set("ref", reference.to_string());
        }
        if let Some(rev) = rev {
            input.set("rev", rev.to_string());
        }
        Ok(input)
    }
}

fn clone_or_fetch(cache_dir: &PathBuf, url: &str, reference: &str) -> Result<Repository> {
    let repo = if cache_dir.join("HEAD").exists() {
        Repository::open_bare(cache_dir).map_err(|e| Error::Custom(e.to_string()))?
    } else {
        std::fs::create_dir_all(cache_dir.parent().unwrap_or(cache_dir))?;
        Repository::init_bare(cache_dir).map_err(|e| Error::Custom(e.to_string()))?
    };

    let refspec = format!("+{reference}:refs/nixrs/{reference}");
    repo.remote_anonymous(url)
        .and_then(|mut remote| remote.fetch(&[refspec.as_str(), "+HEAD:refs/nixrs/HEAD"], None, None))
        .map_err(|e| Error::Network(url.to_string(), e.to_string()))?;
    Ok(repo)
}

/// Clones (or updates a persistent bare clone of) `input`'s repository,
/// resolves `ref`/`rev` to a commit, and hands back a tree-level accessor
/// pinned to that commit. `submodules` is accepted as an attribute but not
/// recursively fetched — each submodule is a `git` input in its own right
/// and should be locked the same way, not silently pulled in by its parent.
pub async fn get_accessor<S: Store + Send>(
    store: &mut S,
    input: &Input,
) -> Result<(Arc<dyn InputAccessor>, LockedInput)> {
    let url = input
        .get_str("url")
        .ok_or_else(|| Error::InvalidAttr("url".to_string(), "missing".to_string()))?
        .to_string();
    let reference = input.get_str("ref").unwrap_or("HEAD").to_string();
    let rev = input.get_str("rev").map(|s| s.to_string());
    let cache_dir = cache_dir_for_url("git", &url);

    let (commit, repo) = tokio::task::spawn_blocking({
        let url = url.clone();
        let reference = reference.clone();
        let rev = rev.clone();
        let cache_dir = cache_dir.clone();
        move || -> Result<(git2::Oid, Repository)> {
            let repo = clone_or_fetch(&cache_dir, &url, &reference)?;
            let oid = match rev {
                Some(rev) => git2::Oid::from_str(&rev).map_err(|e| Error::Custom(e.to_string()))?,
                None => {
                    let reference = repo
                        .find_reference(&format!("refs/nixrs/{reference}"))
                        .or_else(|_| repo.find_reference("refs/nixrs/HEAD"))
                        .map_err(|e| Error::Custom(e.to_string()))?;
                    reference
                        .peel_to_commit()
                        .map_err(|e| Error::Custom(e.to_string()))?
                        .id()
                }
            };
            Ok((oid, repo))
        }
    })
    .await
    .map_err(|e| Error::Custom(e.to_string()))??;

    let display_name = format!("{url}#{commit}");
    let git_accessor = GitTreeAccessor::new(display_name, repo, commit);

    let name = input.get_str("name").unwrap_or("source");
    let store_path =
        fetch_to_store(&git_accessor, "", store, name, ContentAddressMethod::Recursive).await?;

    let mut locked_attrs = input.attrs().clone();
    locked_attrs.insert("rev".to_string(), commit.to_string().into());
    let locked = LockedInput::new(Input::new(locked_attrs), store_path);
    Ok((Arc::new(git_accessor), locked))
}
