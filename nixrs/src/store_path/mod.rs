mod content_address;
mod path;
mod store_dir;

pub use content_address::{
    ContentAddress, ContentAddressMethod, ContentAddressMethodAlgorithm,
    ContentAddressWithReferences, FileIngestionMethod, FixedOutputInfo, ParseContentAddressError,
    StoreReferences, TextInfo,
};
pub use path::{
    is_name, ParseStorePathError, ReadStorePathError, StorePath, StorePathError, StorePathHash,
    StorePathName, StorePathNameError, StorePathSet, StorePathSetExt, STORE_PATH_HASH_BYTES,
    STORE_PATH_HASH_CHARS,
};
pub use store_dir::{FromStoreDirStr, StoreDir, StoreDirDisplay, StoreDirProvider};

#[cfg(any(test, feature = "test"))]
pub use path::proptest;
