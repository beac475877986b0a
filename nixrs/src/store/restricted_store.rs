use std::sync::{Arc, Mutex as StdMutex};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::path_info::ValidPathInfo;
use crate::realisation::Realisation;
use crate::signature::SignatureSet;
use crate::store::daemon::TrustedFlag;
use crate::store::{
    BasicDerivation, BuildResult, BuildSettings, CheckSignaturesFlag, DerivedPath, Error,
    RepairFlag, Store, SubstituteFlag,
};
use crate::store_path::{StoreDir, StoreDirProvider, StorePath, StorePathSet};

/// A view onto an inner store for the use of a single derivation's build.
///
/// Hides every path that isn't one of the derivation's declared inputs or
/// wasn't added at runtime (via [`Store::add_to_store`] or a forwarded
/// build), so a sandboxed builder using `builtins.storePath` or recursive
/// Nix can't see paths it has no business depending on. Every path or
/// realisation that does get added this way is also recorded so the owning
/// goal can fold it into the derivation's dependency set, keeping it
/// reachable from the goal's closure even though it never went through the
/// normal input-closure computation.
pub struct RestrictedStore<S> {
    inner: Arc<Mutex<S>>,
    store_dir: StoreDir,
    allowed: Arc<StdMutex<StorePathSet>>,
    recorded: Arc<StdMutex<StorePathSet>>,
    realisations: Arc<StdMutex<Vec<Realisation>>>,
}

impl<S> Clone for RestrictedStore<S> {
    fn clone(&self) -> Self {
        RestrictedStore {
            inner: self.inner.clone(),
            store_dir: self.store_dir.clone(),
            allowed: self.allowed.clone(),
            recorded: self.recorded.clone(),
            realisations: self.realisations.clone(),
        }
    }
}

impl<S> RestrictedStore<S> {
    /// `allowed` should start out as the derivation's declared input
    /// closure; paths outside it are invisible until added at runtime.
    pub fn new(store_dir: StoreDir, inner: S, allowed: StorePathSet) -> Self {
        RestrictedStore {
            inner: Arc::new(Mutex::new(inner)),
            store_dir,
            allowed: Arc::new(StdMutex::new(allowed)),
            recorded: Arc::new(StdMutex::new(StorePathSet::new())),
            realisations: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// A sandboxed builder using this store is never a trusted client.
    pub fn is_trusted_client(&self) -> TrustedFlag {
        TrustedFlag::NotTrusted
    }

    fn is_allowed(&self, path: &StorePath) -> bool {
        self.allowed.lock().unwrap().contains(path)
    }

    fn allow(&self, path: StorePath) {
        self.allowed.lock().unwrap().insert(path.clone());
        self.recorded.lock().unwrap().insert(path);
    }

    /// Paths that became visible at runtime (via `add_to_store`, forwarded
    /// builds, or substitution) since this store was created. The owning
    /// goal merges these into the derivation's closure.
    pub fn recorded_paths(&self) -> StorePathSet {
        self.recorded.lock().unwrap().clone()
    }

    /// Realisations recorded from derivations built through this store.
    pub fn recorded_realisations(&self) -> Vec<Realisation> {
        self.realisations.lock().unwrap().clone()
    }
}

impl<S> StoreDirProvider for RestrictedStore<S> {
    fn store_dir(&self) -> StoreDir {
        self.store_dir.clone()
    }
}

#[async_trait]
impl<S> Store for RestrictedStore<S>
where
    S: Store + Send,
{
    async fn query_valid_paths(
        &mut self,
        paths: &StorePathSet,
        _maybe_substitute: SubstituteFlag,
    ) -> Result<StorePathSet, Error> {
        let allowed: StorePathSet = paths.iter().filter(|p| self.is_allowed(p)).cloned().collect();
        if allowed.is_empty() {
            return Ok(StorePathSet::new());
        }
        let mut inner = self.inner.lock().await;
        inner
            .query_valid_paths(&allowed, SubstituteFlag::NoSubstitute)
            .await
    }

    async fn query_path_info(&mut self, path: &StorePath) -> Result<Option<ValidPathInfo>, Error> {
        if !self.is_allowed(path) {
            return Ok(None);
        }
        let mut inner = self.inner.lock().await;
        match inner.query_path_info(path).await? {
            Some(mut info) => {
                info.deriver = None;
                info.registration_time = SystemTime::UNIX_EPOCH;
                info.ultimate = false;
                info.sigs = SignatureSet::new();
                Ok(Some(info))
            }
            None => Ok(None),
        }
    }

    async fn nar_from_path<W: AsyncWrite + Send + Unpin>(
        &mut self,
        path: &StorePath,
        sink: W,
    ) -> Result<(), Error> {
        if !self.is_allowed(path) {
            return Err(Error::RestrictedPath(path.to_string()));
        }
        let mut inner = self.inner.lock().await;
        inner.nar_from_path(path, sink).await
    }

    async fn add_to_store<R: AsyncRead + Send + Unpin>(
        &mut self,
        info: &ValidPathInfo,
        source: R,
        repair: RepairFlag,
        check_sigs: CheckSignaturesFlag,
    ) -> Result<(), Error> {
        {
            let mut inner = self.inner.lock().await;
            inner.add_to_store(info, source, repair, check_sigs).await?;
        }
        self.allow(info.path.clone());
        Ok(())
    }

    async fn build_derivation<W: AsyncWrite + Send + Unpin>(
        &mut self,
        drv_path: &StorePath,
        drv: &BasicDerivation,
        settings: &BuildSettings,
        build_log: W,
    ) -> Result<BuildResult, Error> {
        let result = {
            let mut inner = self.inner.lock().await;
            inner
                .build_derivation(drv_path, drv, settings, build_log)
                .await?
        };
        {
            let mut realisations = self.realisations.lock().unwrap();
            for realisation in result.built_outputs.values() {
                self.allow(realisation.out_path.clone());
                realisations.push(realisation.clone());
            }
        }
        Ok(result)
    }

    async fn build_paths<W: AsyncWrite + Send + Unpin>(
        &mut self,
        drv_paths: &[DerivedPath],
        settings: &BuildSettings,
        build_log: W,
    ) -> Result<(), Error> {
        {
            let mut inner = self.inner.lock().await;
            inner.build_paths(drv_paths, settings, build_log).await?;
        }
        for derived_path in drv_paths {
            // `Built` outputs are only resolved to concrete paths through a
            // derivation output map, which this generic wrapper doesn't have
            // access to; those become visible once the goal that requested
            // them calls `build_derivation` directly and its outputs are
            // recorded there instead.
            if let DerivedPath::Opaque(path) = derived_path {
                self.allow(path.clone());
            }
        }
        Ok(())
    }
}
