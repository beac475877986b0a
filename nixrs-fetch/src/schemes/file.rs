use std::path::Path;
use std::sync::Arc;

use nixrs::store::Store;
use nixrs::store_path::ContentAddressMethod;
use url::Url;

use crate::accessor::{InputAccessor, PosixAccessor};
use crate::error::{Error, Result};
use crate::input::{decode_url_path, parse_query_attrs, Attrs, Input};
use crate::lock::LockedInput;
use crate::scheme::InputScheme;

/// `file:` URLs name one file rather than a tree — the input a bare
/// `import (fetchurl { url = ...; })` resolves to before `tarball` unpacks
/// it. Distinct from `path` because `path` always denotes a directory and
/// is never fetched across the network.
pub struct FileScheme;

impl InputScheme for FileScheme {
    fn scheme_type(&self) -> &'static str {
        "file"
    }

    fn input_from_url(&self, url: &Url, _require_tree: bool) -> Result<Option<Input>> {
        if url.scheme() != "file" {
            return Ok(None);
        }
        let mut attrs = parse_query_attrs(url);
        attrs.insert("type".to_string(), "file".into());
        attrs.insert("path".to_string(), decode_url_path(url).into());
        Ok(Some(Input::new(attrs)))
    }

    fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>> {
        if attrs.get("path").and_then(|v| v.as_str()).is_none() {
            return Err(Error::InvalidAttr(
                "path".to_string(),
                "required for the 'file' scheme".to_string(),
            ));
        }
        Ok(Some(Input::new(attrs.clone())))
    }

    fn allowed_attrs(&self) -> &'static [&'static str] {
        &["type", "path", "narHash"]
    }

    fn to_url(&self, input: &Input) -> Result<Url> {
        let path = input
            .get_str("path")
            .ok_or_else(|| Error::InvalidAttr("path".to_string(), "missing".to_string()))?;
        Url::parse(&format!("file:{path}")).map_err(|e| Error::Custom(e.to_string()))
    }
}

pub async fn get_accessor<S: Store + Send>(
    store: &mut S,
    input: &Input,
) -> Result<(Arc<dyn InputAccessor>, LockedInput)> {
    let path_str = input
        .get_str("path")
        .ok_or_else(|| Error::InvalidAttr("path".to_string(), "missing".to_string()))?;
    let path = Path::new(path_str);
    let accessor = PosixAccessor::new(path.parent().unwrap_or(Path::new("/")));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidAttr("path".to_string(), "has no file name".to_string()))?;

    let store_path =
        crate::accessor::fetch_to_store(&accessor, &file_name, store, &file_name, ContentAddressMethod::Flat)
            .await?;

    let locked = LockedInput::new(input.clone(), store_path);
    Ok((Arc::new(accessor), locked))
}
