use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{FutureExt, SinkExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::archive::{NarEvent, NarWriter};
use crate::derivation::BasicDerivation;
use crate::derived_path::OutputName;
use crate::hash;
use crate::path_info::ValidPathInfo;
use crate::realisation::{DrvOutput, Realisation};
use crate::store::{CheckSignaturesFlag, Error, RepairFlag, Store};
use crate::store_path::{
    ContentAddressWithReferences, FileIngestionMethod, FixedOutputInfo, StoreDir,
    StoreDirProvider, StorePath, StorePathSet, StoreReferences,
};

fn encode_single_file_nar(content: &[u8], executable: bool) -> Bytes {
    let mut buf = Vec::new();
    let mut writer = NarWriter::new(Cursor::new(&mut buf));
    writer
        .send(NarEvent::File {
            name: Bytes::new(),
            executable,
            size: content.len() as u64,
            reader: Cursor::new(Bytes::copy_from_slice(content)),
        })
        .now_or_never()
        .expect("BUG: NarWriter blocks on an in-memory sink")
        .expect("BUG: NarWriter returned an error encoding a single file");
    writer
        .close()
        .now_or_never()
        .expect("BUG: NarWriter close blocks on an in-memory sink")
        .expect("BUG: NarWriter close errored on an in-memory sink");
    buf.into()
}

struct Contents {
    info: ValidPathInfo,
    nar: Bytes,
}

#[derive(Default)]
struct State {
    contents: BTreeMap<StorePath, Contents>,
    derivations: BTreeMap<StorePath, BasicDerivation>,
    build_trace: BTreeMap<hash::Hash, BTreeMap<OutputName, Realisation>>,
}

/// An in-memory store with no on-disk footprint.
///
/// Paths, derivations and realisations all live in a shared map behind a
/// mutex, so cloned handles see each other's writes. By default the store
/// is read-only, mirroring a binary cache or a build sandbox that should
/// never grow its own content; use [`DummyStore::writable`] for a store
/// tests can populate directly.
#[derive(Clone)]
pub struct DummyStore {
    store_dir: StoreDir,
    read_only: bool,
    state: Arc<Mutex<State>>,
}

impl Default for DummyStore {
    fn default() -> Self {
        DummyStore::new()
    }
}

impl DummyStore {
    pub fn new() -> Self {
        Self::with_store_dir(StoreDir::default())
    }

    pub fn with_store_dir(store_dir: StoreDir) -> Self {
        DummyStore {
            store_dir,
            read_only: true,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// A dummy store that accepts writes, for tests that need to seed it.
    pub fn writable() -> Self {
        DummyStore {
            read_only: false,
            ..Self::new()
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn check_writable(&self, path: &str) -> Result<(), Error> {
        if self.read_only {
            Err(Error::ReadOnlyStore(path.into()))
        } else {
            Ok(())
        }
    }

    /// Add a single flat file to the store, computing its path from the
    /// content address of its NAR serialisation the way `nix-store --add`
    /// would for a non-recursive add.
    pub fn add_text_to_store(
        &mut self,
        name: &str,
        content: &[u8],
        executable: bool,
    ) -> Result<StorePath, Error> {
        self.check_writable(name)?;
        let nar = encode_single_file_nar(content, executable);
        let nar_hash = hash::digest(hash::Algorithm::SHA256, &nar[..]);
        // the recursive/NixArchive ingestion method content-addresses the
        // NAR serialisation itself, so the CA hash and the NAR hash coincide.
        let ca = ContentAddressWithReferences::Fixed(FixedOutputInfo {
            method: FileIngestionMethod::Recursive,
            hash: nar_hash,
            references: StoreReferences::default(),
        });
        let path = self.store_dir.make_fixed_output_path_from_ca(name, &ca)?;
        let info = ValidPathInfo {
            path: path.clone(),
            deriver: None,
            nar_size: nar.len() as u64,
            nar_hash,
            references: StorePathSet::new(),
            sigs: Default::default(),
            registration_time: SystemTime::now(),
            ultimate: false,
            ca: Some(ca.content_address()),
        };
        let mut state = self.state.lock().unwrap();
        state.contents.insert(
            path.clone(),
            Contents {
                info,
                nar,
            },
        );
        Ok(path)
    }

    /// Record a derivation, as `writeDerivation` does for the real store.
    pub fn write_derivation(&mut self, drv: &BasicDerivation) -> Result<StorePath, Error> {
        self.check_writable(&drv.drv_path.to_string())?;
        let mut state = self.state.lock().unwrap();
        state.derivations.insert(drv.drv_path.clone(), drv.clone());
        Ok(drv.drv_path.clone())
    }

    pub fn get_derivation(&self, path: &StorePath) -> Option<BasicDerivation> {
        let state = self.state.lock().unwrap();
        state.derivations.get(path).cloned()
    }

    /// Record that building `realisation.id` produced `realisation`, the
    /// way the build trace in a binary cache's `Map<DrvOutput, Realisation>`
    /// would after a CA build.
    pub fn insert_realisation(&mut self, realisation: Realisation) {
        let mut state = self.state.lock().unwrap();
        state
            .build_trace
            .entry(realisation.id.drv_hash)
            .or_default()
            .insert(realisation.id.output_name.clone(), realisation);
    }

    pub fn query_realisation(&self, drv_output: &DrvOutput) -> Option<Realisation> {
        let state = self.state.lock().unwrap();
        state
            .build_trace
            .get(&drv_output.drv_hash)
            .and_then(|outputs| outputs.get(&drv_output.output_name))
            .cloned()
    }
}

impl StoreDirProvider for DummyStore {
    fn store_dir(&self) -> StoreDir {
        self.store_dir.clone()
    }
}

#[async_trait]
impl Store for DummyStore {
    async fn query_path_info(&mut self, path: &StorePath) -> Result<Option<ValidPathInfo>, Error> {
        let state = self.state.lock().unwrap();
        Ok(state.contents.get(path).map(|c| c.info.clone()))
    }

    async fn nar_from_path<W: AsyncWrite + Send + Unpin>(
        &mut self,
        path: &StorePath,
        mut sink: W,
    ) -> Result<(), Error> {
        let nar = {
            let state = self.state.lock().unwrap();
            state.contents.get(path).map(|c| c.nar.clone())
        };
        match nar {
            Some(nar) => {
                sink.write_all(&nar).await?;
                Ok(())
            }
            None => Err(Error::InvalidPath(path.to_string())),
        }
    }

    async fn add_to_store<R: AsyncRead + Send + Unpin>(
        &mut self,
        info: &ValidPathInfo,
        mut source: R,
        _repair: RepairFlag,
        _check_sigs: CheckSignaturesFlag,
    ) -> Result<(), Error> {
        self.check_writable(&info.path.to_string())?;
        let mut nar = Vec::new();
        source.read_to_end(&mut nar).await?;
        let mut state = self.state.lock().unwrap();
        state.contents.insert(
            info.path.clone(),
            Contents {
                info: info.clone(),
                nar: nar.into(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod unittests {
    use crate::store::SubstituteFlag;

    use super::*;

    #[tokio::test]
    async fn read_only_by_default() {
        let mut store = DummyStore::new();
        assert!(store.is_read_only());
        let err = store.add_text_to_store("my-file", b"asdf", false).unwrap_err();
        assert!(matches!(err, Error::ReadOnlyStore(_)));
    }

    #[tokio::test]
    async fn add_text_to_store_round_trips() {
        let mut store = DummyStore::writable();
        let path = store.add_text_to_store("my-file", b"asdf", false).unwrap();

        let info = store.query_path_info(&path).await.unwrap().unwrap();
        assert_eq!(info.path, path);

        let mut nar = Vec::new();
        store.nar_from_path(&path, &mut nar).await.unwrap();
        assert_eq!(nar.len() as u64, info.nar_size);
    }

    #[tokio::test]
    async fn query_path_info_missing_is_none() {
        let mut store = DummyStore::writable();
        let path = store.add_text_to_store("other-file", b"xyz", false).unwrap();
        store.state.lock().unwrap().contents.remove(&path);
        assert_eq!(None, store.query_path_info(&path).await.unwrap());
    }

    #[tokio::test]
    async fn query_valid_paths_uses_default_impl() {
        let mut store = DummyStore::writable();
        let path = store.add_text_to_store("my-file", b"asdf", false).unwrap();
        let mut wanted = StorePathSet::new();
        wanted.insert(path.clone());
        let valid = store
            .query_valid_paths(&wanted, SubstituteFlag::NoSubstitute)
            .await
            .unwrap();
        assert_eq!(valid, wanted);
    }

    #[tokio::test]
    async fn realisation_round_trips() {
        let mut store = DummyStore::writable();
        let drv_hash = hash::digest(hash::Algorithm::SHA256, "some-derivation");
        let output_name: OutputName = "foo".parse().unwrap();
        let drv_output = DrvOutput {
            drv_hash,
            output_name: output_name.clone(),
        };

        assert_eq!(None, store.query_realisation(&drv_output));

        let out_path = store.add_text_to_store("foo-out", b"result", false).unwrap();
        let realisation = Realisation {
            id: drv_output.clone(),
            out_path,
            signatures: Default::default(),
            dependent_realisations: Default::default(),
        };
        store.insert_realisation(realisation.clone());

        assert_eq!(Some(realisation), store.query_realisation(&drv_output));
    }

    #[tokio::test]
    async fn write_derivation_rejected_when_read_only() {
        let mut store = DummyStore::new();
        let drv = BasicDerivation {
            drv_path: StorePath::new_from_base_name(
                "g1w7hy3qg1w7hy3qg1w7hy3qg1w7hy3q-foo.drv",
            )
            .unwrap(),
            outputs: Default::default(),
            input_srcs: Default::default(),
            platform: Default::default(),
            builder: Default::default(),
            args: Default::default(),
            env: Default::default(),
        };
        let err = store.write_derivation(&drv).unwrap_err();
        assert!(matches!(err, Error::ReadOnlyStore(_)));
    }
}
