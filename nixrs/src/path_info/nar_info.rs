use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use thiserror::Error;

use crate::hash::fmt::Any;
use crate::hash::Hash;
use crate::io::StateParse;
use crate::signature::{ParseSignatureError, Signature};
use crate::store_path::{ContentAddress, ParseContentAddressError, ParseStorePathError, StoreDir};

use super::ValidPathInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Compression {
    None,
    XZ,
    Bzip2,
    GZip,
    Zstd,
    BR,
    Unknown(u8),
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::XZ => write!(f, "xz"),
            Compression::Bzip2 => write!(f, "bzip2"),
            Compression::GZip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
            Compression::BR => write!(f, "br"),
            Compression::Unknown(_) => write!(f, "unknown"),
        }
    }
}

impl FromStr for Compression {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "none" => Compression::None,
            "xz" => Compression::XZ,
            "bzip2" => Compression::Bzip2,
            "gzip" => Compression::GZip,
            "zstd" => Compression::Zstd,
            "br" => Compression::BR,
            _ => Compression::Unknown(0),
        })
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ParseNarInfoError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("duplicate field '{0}'")]
    DuplicateField(&'static str),
    #[error("bad store path: {0}")]
    StorePath(
        #[from]
        #[source]
        ParseStorePathError,
    ),
    #[error("bad hash: {0}")]
    Hash(
        #[from]
        #[source]
        crate::hash::fmt::ParseHashError,
    ),
    #[error("bad signature: {0}")]
    Signature(
        #[from]
        #[source]
        ParseSignatureError,
    ),
    #[error("bad content address: {0}")]
    ContentAddress(
        #[from]
        #[source]
        ParseContentAddressError,
    ),
    #[error("invalid integer field '{0}'")]
    BadInteger(&'static str),
}

/// A parsed `.narinfo` file, as served by binary cache substituters: the
/// `ValidPathInfo` for the path plus the location and compression of its NAR.
#[derive(Debug, Clone, PartialEq)]
pub struct NarInfo {
    pub path_info: ValidPathInfo,
    pub url: String,
    pub compression: Compression,
    pub file_hash: Option<Hash>,
    pub file_size: Option<u64>,
}

impl NarInfo {
    pub fn parse(store_dir: &StoreDir, s: &str) -> Result<NarInfo, ParseNarInfoError> {
        let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
        for line in s.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                let value = value.trim();
                if fields.insert(key, value).is_some() && key != "Sig" {
                    return Err(ParseNarInfoError::DuplicateField(match key {
                        "StorePath" => "StorePath",
                        "URL" => "URL",
                        "Compression" => "Compression",
                        "FileHash" => "FileHash",
                        "FileSize" => "FileSize",
                        "NarHash" => "NarHash",
                        "NarSize" => "NarSize",
                        "References" => "References",
                        "Deriver" => "Deriver",
                        "CA" => "CA",
                        _ => "field",
                    }));
                }
            }
        }

        let store_path = fields
            .get("StorePath")
            .copied()
            .ok_or(ParseNarInfoError::MissingField("StorePath"))?;
        let path: crate::store_path::StorePath = store_dir.parse(store_path)?;

        let url = fields
            .get("URL")
            .ok_or(ParseNarInfoError::MissingField("URL"))?
            .to_string();

        let compression = fields
            .get("Compression")
            .map(|s| s.parse().unwrap())
            .unwrap_or(Compression::XZ);

        let file_hash = fields
            .get("FileHash")
            .map(|s| s.parse::<Any<Hash>>().map(|a| a.into_hash()))
            .transpose()?;

        let file_size = fields
            .get("FileSize")
            .map(|s| s.parse::<u64>().map_err(|_| ParseNarInfoError::BadInteger("FileSize")))
            .transpose()?;

        let nar_hash = fields
            .get("NarHash")
            .ok_or(ParseNarInfoError::MissingField("NarHash"))?
            .parse::<Any<Hash>>()?
            .into_hash();

        let nar_size = fields
            .get("NarSize")
            .ok_or(ParseNarInfoError::MissingField("NarSize"))?
            .parse::<u64>()
            .map_err(|_| ParseNarInfoError::BadInteger("NarSize"))?;

        let mut references = crate::store_path::StorePathSet::new();
        if let Some(refs) = fields.get("References") {
            for name in refs.split_whitespace() {
                references.insert(store_dir.parse(name)?);
            }
        }

        let deriver = fields
            .get("Deriver")
            .map(|name| store_dir.parse(name))
            .transpose()?;

        let ca: Option<ContentAddress> = fields.get("CA").map(|s| s.parse()).transpose()?;

        let mut sigs = crate::signature::SignatureSet::new();
        for line in s.lines() {
            if let Some(("Sig", value)) = line.trim().split_once(':') {
                sigs.insert(value.trim().parse::<Signature>().map_err(|e| {
                    ParseNarInfoError::Signature(e)
                })?);
            }
        }

        Ok(NarInfo {
            path_info: ValidPathInfo {
                path,
                deriver,
                nar_size,
                nar_hash,
                references,
                sigs,
                registration_time: SystemTime::UNIX_EPOCH,
                ultimate: false,
                ca,
            },
            url,
            compression,
            file_hash,
            file_size,
        })
    }
}

#[cfg(test)]
mod unittests {
    use super::*;

    #[test]
    fn parse_minimal_narinfo() {
        let store_dir = StoreDir::default();
        let text = "StorePath: /nix/store/7rjj86a15146cq1d3qy068lml7n7ykzm-gcc-wrapper-12.3.0\n\
URL: nar/1111111111111111111111111111111111111111111111111111.nar.xz\n\
Compression: xz\n\
NarHash: sha256:0000000000000000000000000000000000000000000000000000000000000000000000000000\n\
NarSize: 1234\n\
References: \n";
        let info = NarInfo::parse(&store_dir, text).unwrap();
        assert_eq!(info.compression, Compression::XZ);
        assert_eq!(info.path_info.nar_size, 1234);
    }

    #[test]
    fn parse_missing_field_fails() {
        let store_dir = StoreDir::default();
        assert!(NarInfo::parse(&store_dir, "URL: foo\n").is_err());
    }
}
