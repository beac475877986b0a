use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::hash as std_hash;
use std::ops::Deref;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

#[cfg(feature = "nixrs-derive")]
use nixrs_derive::{NixDeserialize, NixSerialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::base32;
use crate::hash;

use super::FromStoreDirStr;
use super::StoreDir;
use super::StoreDirDisplay;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(feature = "nixrs-derive", derive(NixDeserialize, NixSerialize))]
#[cfg_attr(feature = "nixrs-derive", nix(from_store_dir_str, store_dir_display))]
pub struct StorePath {
    hash: StorePathHash,
    name: StorePathName,
}

fn strip_store<'s>(s: &'s str, store_dir: &StoreDir) -> Result<&'s str, StorePathError> {
    let path = Path::new(s);
    if !path.is_absolute() {
        return Err(StorePathError::NonAbsolute(path.to_owned()));
    }
    let name = s
        .strip_prefix(store_dir.to_str())
        .ok_or_else(|| StorePathError::NotInStore(path.into()))?;
    if name.as_bytes()[0] != b'/' {
        return Err(StorePathError::NotInStore(path.into()));
    }

    Ok(&name[1..])
}

impl StorePath {
    pub fn new_from_base_name(s: &str) -> Result<Self, ParseStorePathError> {
        s.parse()
    }

    pub(super) fn new(s: &str, store_dir: &StoreDir) -> Result<Self, ParseStorePathError> {
        let name = strip_store(s, store_dir).map_err(|error| ParseStorePathError {
            path: s.to_owned(),
            error,
        })?;
        name.parse::<Self>().map_err(|error| ParseStorePathError {
            path: s.to_owned(),
            error: error.error,
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self, StorePathError> {
        if buf.len() < STORE_PATH_HASH_ENCODED_SIZE + 1 {
            return Err(StorePathError::HashLength);
        }
        if buf[STORE_PATH_HASH_ENCODED_SIZE] != b'-' {
            return Err(StorePathError::Symbol(
                STORE_PATH_HASH_ENCODED_SIZE as u8,
                buf[STORE_PATH_HASH_ENCODED_SIZE],
            ));
        }
        let hash = StorePathHash::decode_digest(&buf[..STORE_PATH_HASH_ENCODED_SIZE])?;
        let name = buf[(STORE_PATH_HASH_ENCODED_SIZE + 1)..]
            .try_into()
            .map_err(|err| {
                StorePathError::adjust_index(STORE_PATH_HASH_ENCODED_SIZE as u8 + 1, err)
            })?;
        Ok(StorePath { hash, name })
    }

    pub fn from_hash(hash: &hash::Sha256, name: &str) -> Result<Self, StorePathError> {
        Ok(StorePath {
            hash: StorePathHash::new_from_hash(hash),
            name: name.parse()?,
        })
    }

    pub fn name(&self) -> &StorePathName {
        &self.name
    }

    pub fn hash(&self) -> &StorePathHash {
        &self.hash
    }
}

impl fmt::Debug for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StorePath")
            .field(&format_args!("{}", self))
            .finish()
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.name)
    }
}

impl From<(StorePathHash, StorePathName)> for StorePath {
    fn from((hash, name): (StorePathHash, StorePathName)) -> Self {
        StorePath { hash, name }
    }
}

impl TryFrom<&[u8]> for StorePath {
    type Error = StorePathError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        StorePath::from_bytes(value)
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("parse error {path}, {error}")]
pub struct ParseStorePathError {
    pub path: String,
    pub error: StorePathError,
}

impl ParseStorePathError {
    pub fn new(path: &str, error: StorePathError) -> ParseStorePathError {
        ParseStorePathError {
            path: path.to_owned(),
            error,
        }
    }
}

impl FromStr for StorePath {
    type Err = ParseStorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorePath::from_bytes(s.as_bytes()).map_err(|error| ParseStorePathError {
            path: s.to_owned(),
            error,
        })
    }
}

impl AsRef<StorePathName> for StorePath {
    fn as_ref(&self) -> &StorePathName {
        &self.name
    }
}

impl AsRef<StorePathHash> for StorePath {
    fn as_ref(&self) -> &StorePathHash {
        &self.hash
    }
}

impl FromStoreDirStr for StorePath {
    type Error = ParseStorePathError;

    fn from_store_dir_str(store_dir: &super::StoreDir, s: &str) -> Result<Self, Self::Error> {
        StorePath::new(s, store_dir)
    }
}

impl StoreDirDisplay for StorePath {
    fn fmt(&self, store_dir: &StoreDir, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", store_dir, self)
    }
}

const STORE_PATH_HASH_SIZE: usize = 20;
const STORE_PATH_HASH_ENCODED_SIZE: usize = base32::encode_len(STORE_PATH_HASH_SIZE);

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "nixrs-derive", derive(NixDeserialize, NixSerialize))]
#[cfg_attr(feature = "nixrs-derive", nix(from_str, display))]
pub struct StorePathHash([u8; STORE_PATH_HASH_SIZE]);

impl StorePathHash {
    pub const fn len() -> usize {
        STORE_PATH_HASH_SIZE
    }

    pub const fn encoded_len() -> usize {
        STORE_PATH_HASH_ENCODED_SIZE
    }

    pub fn new(value: [u8; STORE_PATH_HASH_SIZE]) -> StorePathHash {
        StorePathHash(value)
    }

    pub fn new_from_hash(hash: &hash::Sha256) -> Self {
        let mut digest = [0u8; STORE_PATH_HASH_SIZE];
        for (i, item) in hash.as_ref().iter().enumerate() {
            let idx = i % STORE_PATH_HASH_SIZE;
            digest[idx] ^= item;
        }
        StorePathHash(digest)
    }

    pub fn copy_from_slice(data: &[u8]) -> StorePathHash {
        let mut digest = [0u8; STORE_PATH_HASH_SIZE];
        digest.copy_from_slice(data);
        StorePathHash::new(digest)
    }

    pub fn decode_digest(data: &[u8]) -> Result<StorePathHash, StorePathError> {
        if data.len() != base32::encode_len(STORE_PATH_HASH_SIZE) {
            return Err(StorePathError::HashLength);
        }
        let mut hash_output = [0u8; STORE_PATH_HASH_SIZE];
        base32::decode_mut(data, &mut hash_output).map_err(|err| {
            StorePathError::Symbol(err.error.position as u8, data[err.error.position])
        })?;
        Ok(StorePathHash::new(hash_output))
    }
}

impl fmt::Debug for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePathHash({})", self)
    }
}

impl fmt::Display for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut output = [0u8; base32::encode_len(STORE_PATH_HASH_SIZE)];
        base32::encode_mut(&self.0, &mut output);

        // SAFETY: Nix Base32 is a subset of ASCII, which guarantees valid UTF-8.
        let s = unsafe { std::str::from_utf8_unchecked(&output) };
        f.write_str(s)
    }
}

impl TryFrom<&[u8]> for StorePathHash {
    type Error = StorePathError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        if data.len() != Self::len() {
            return Err(StorePathError::HashLength);
        }
        Ok(Self::copy_from_slice(data))
    }
}

impl FromStr for StorePathHash {
    type Err = StorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorePathHash::decode_digest(s.as_bytes())
    }
}

impl std_hash::Hash for StorePathHash {
    fn hash<H: std_hash::Hasher>(&self, state: &mut H) {
        for c in self.0.iter().rev() {
            c.hash(state);
        }
    }
}

impl Ord for StorePathHash {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl PartialOrd for StorePathHash {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl AsRef<[u8]> for StorePathHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for StorePathHash {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

macro_rules! partial_eq_self {
    ($own:ty) => {
        impl PartialEq<&$own> for $own {
            fn eq(&self, other: &&$own) -> bool {
                self == **other
            }
        }
        impl PartialEq<$own> for &$own {
            fn eq(&self, other: &$own) -> bool {
                *self == other
            }
        }
    };
}
macro_rules! partial_eq {
    ($own:ty, $ty:ty) => {
        impl PartialEq<$ty> for $own {
            fn eq(&self, other: &$ty) -> bool {
                self.0 == *other
            }
        }
        impl PartialEq<$own> for $ty {
            fn eq(&self, other: &$own) -> bool {
                *self == other.0
            }
        }
    };
}
partial_eq_self!(StorePathHash);
partial_eq!(StorePathHash, &'_ [u8]);
partial_eq!(StorePathHash, [u8; STORE_PATH_HASH_SIZE]);

const NAME_LOOKUP: [bool; 256] = {
    let mut ret = [false; 256];
    let mut idx = 0usize;
    while idx < u8::MAX as usize {
        let ch = idx as u8;
        ret[idx] = matches!(ch, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'+' | b'-' | b'_' | b'?' | b'=' | b'.');
        idx += 1;
    }
    ret
};
pub(crate) const MAX_NAME_LEN: usize = 211;

pub fn into_name<V: AsRef<[u8]>>(s: &V) -> Result<&str, StorePathError> {
    let s = s.as_ref();
    if s.is_empty() || s.len() > MAX_NAME_LEN {
        return Err(StorePathError::NameLength);
    }

    for (idx, ch) in s.iter().enumerate() {
        if !NAME_LOOKUP[*ch as usize] {
            return Err(StorePathError::Symbol(idx as u8, *ch));
        }
    }

    // SAFETY: We checked above that it is a subset of ASCII, which guarantees valid UTF-8.
    let ret = unsafe { std::str::from_utf8_unchecked(s) };
    Ok(ret)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePathName(String);

impl fmt::Display for StorePathName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&[u8]> for StorePathName {
    type Error = StorePathError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let name = into_name(&value)?;
        Ok(StorePathName(name.into()))
    }
}

impl FromStr for StorePathName {
    type Err = StorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.as_bytes().try_into()
    }
}

impl AsRef<str> for StorePathName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for StorePathName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

partial_eq_self!(StorePathName);
partial_eq!(StorePathName, &'_ str);
partial_eq!(StorePathName, String);
partial_eq!(StorePathName, Cow<'_, str>);

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StorePathError {
    #[error("non-absolute store path {0:?}")]
    NonAbsolute(PathBuf),
    #[error("path {0:?} is not in store")]
    NotInStore(PathBuf),
    #[error("invalid store path hash length")]
    HashLength,
    #[error("invalid store path name length")]
    NameLength,
    #[error("invalid store path {ch} symbol at {0}", ch = char::from_u32(*.1 as u32).map(|c| c.to_string()).unwrap_or_else(|| .1.to_string()))]
    Symbol(u8, u8),
    #[error("path {0:?} is not valid UTF-8")]
    BadEncoding(PathBuf),
}

/// Alias for the error `into_name`/name-parsing call sites outside this
/// module use; a store path name component has no errors beyond the ones
/// `StorePathError` already enumerates (`NameLength`, `Symbol`).
pub type StorePathNameError = StorePathError;

/// Errors produced while resolving a filesystem path to a [`StorePath`], including
/// I/O errors encountered while following symlinks.
#[derive(Debug, Error)]
pub enum ReadStorePathError {
    #[error("{0}")]
    BadStorePath(
        #[from]
        #[source]
        ParseStorePathError,
    ),
    #[error("I/O error: {0}")]
    IO(
        #[from]
        #[source]
        std::io::Error,
    ),
}

/// Set of [`StorePath`]s. Ordered, since derived-hash collections (e.g. [`BasicDerivation`](crate::derivation::BasicDerivation))
/// need `Hash` and only [`BTreeSet`] provides that for element types that are themselves `Hash`.
pub type StorePathSet = BTreeSet<StorePath>;

pub trait StorePathSetExt {
    /// Parse a whitespace separated list of store path names (not full paths) relative
    /// to `store_dir` and insert them all into this set.
    fn parse_all<'s, I: IntoIterator<Item = &'s str>>(
        &mut self,
        store_dir: &StoreDir,
        names: I,
    ) -> Result<(), ParseStorePathError>;
}

impl StorePathSetExt for StorePathSet {
    fn parse_all<'s, I: IntoIterator<Item = &'s str>>(
        &mut self,
        store_dir: &StoreDir,
        names: I,
    ) -> Result<(), ParseStorePathError> {
        for name in names {
            self.insert(store_dir.parse(name)?);
        }
        Ok(())
    }
}

/// True if `s` is a valid store path name component (the part after the hash and dash).
pub fn is_name<V: AsRef<[u8]>>(s: &V) -> bool {
    into_name(s).is_ok()
}

pub const STORE_PATH_HASH_BYTES: usize = STORE_PATH_HASH_SIZE;
pub const STORE_PATH_HASH_CHARS: usize = STORE_PATH_HASH_ENCODED_SIZE;

impl StorePathError {
    fn adjust_index(prefix: u8, other: StorePathError) -> StorePathError {
        match other {
            StorePathError::Symbol(old, ch) => StorePathError::Symbol(prefix + old, ch),
            c => c,
        }
    }
}

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    use super::*;
    use ::proptest::{arbitrary::Arbitrary, prelude::*};

    pub fn arb_output_name() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9+\\-_?=][a-zA-Z0-9+\\-_?=.]{0,13}"
    }

    impl Arbitrary for StorePathHash {
        type Parameters = ();
        type Strategy = BoxedStrategy<StorePathHash>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            any::<[u8; STORE_PATH_HASH_SIZE]>()
                .prop_map(StorePathHash)
                .boxed()
        }
    }

    pub fn arb_store_path_name(
        max: u8,
        extension: Option<String>,
    ) -> impl Strategy<Value = StorePathName> {
        "[a-zA-Z0-9+\\-_?=][a-zA-Z0-9+\\-_?=.]{0,210}".prop_map(move |mut s| {
            let mut max = max;
            let len = extension.as_ref().map(|e| e.len() + 1).unwrap_or(0) as u8;
            if max > MAX_NAME_LEN as u8 - len {
                max = MAX_NAME_LEN as u8 - len;
            }
            max -= 1;
            if s.len() > max as usize {
                s.truncate(max as usize);
            }
            if let Some(ext) = extension.as_ref() {
                s.push('.');
                s.push_str(ext);
            }
            s.parse().unwrap()
        })
    }

    impl Arbitrary for StorePathName {
        type Parameters = Option<String>;
        type Strategy = BoxedStrategy<StorePathName>;

        fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
            arb_store_path_name(MAX_NAME_LEN as u8, args).boxed()
        }
    }

    pub fn arb_store_path(max: u8, extension: Option<String>) -> impl Strategy<Value = StorePath> {
        (any::<StorePathHash>(), arb_store_path_name(max, extension))
            .prop_map(|(hash, name)| StorePath { hash, name })
    }

    pub fn arb_drv_store_path() -> impl Strategy<Value = StorePath> {
        arb_store_path(MAX_NAME_LEN as u8 - 4 - 15, Some("drv".into()))
    }

    impl Arbitrary for StorePath {
        type Parameters = Option<String>;
        type Strategy = BoxedStrategy<StorePath>;
        fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
            arb_store_path(MAX_NAME_LEN as u8, args).boxed()
        }
    }
}
