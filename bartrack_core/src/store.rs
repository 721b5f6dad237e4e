//! Parameter repository: a synchronous in-memory snapshot backed by
//! fire-and-forget persistence.
//!
//! Loads happen once at open (and on explicit reload); saves update the
//! snapshot immediately and hand the serialized blob to a background worker
//! that owns the `ParamBlobStore`. Every storage failure is captured as a
//! typed `StoreError` and logged; none of them reach the fusion loop.

use crate::error::{Result, StoreError};
use bartrack_config::UserParams;
use bartrack_traits::ParamBlobStore;
use crossbeam_channel::{Sender, bounded};
use std::collections::HashMap;
use std::path::PathBuf;

/// Pending persist jobs before saves start shedding.
const PERSIST_QUEUE: usize = 4;

pub struct ParamRepository {
    user: String,
    snapshot: UserParams,
    jobs: Option<Sender<Vec<u8>>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl core::fmt::Debug for ParamRepository {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParamRepository")
            .field("user", &self.user)
            .finish()
    }
}

impl ParamRepository {
    /// Load the user's bundle (defaults on missing or corrupt data) and
    /// start the persistence worker.
    pub fn open(user: impl Into<String>, mut store: Box<dyn ParamBlobStore>) -> Self {
        let user = user.into();
        let snapshot = match Self::load_params(&user, &mut store) {
            Ok(Some(params)) => params,
            Ok(None) => UserParams::default(),
            Err(err) => {
                tracing::warn!(error = %err, "falling back to default params");
                UserParams::default()
            }
        };

        let (jobs, rx) = bounded::<Vec<u8>>(PERSIST_QUEUE);
        let worker_user = user.clone();
        let worker = std::thread::spawn(move || {
            for blob in rx.iter() {
                if let Err(e) = store.save(&worker_user, &blob) {
                    let err = StoreError::Persist {
                        user: worker_user.clone(),
                        detail: e.to_string(),
                    };
                    tracing::warn!(error = %err, "write dropped, snapshot still live");
                }
            }
            tracing::trace!(user = %worker_user, "params persist worker exiting");
        });

        Self {
            user,
            snapshot,
            jobs: Some(jobs),
            worker: Some(worker),
        }
    }

    /// One typed-error load attempt: `Ok(None)` when the user has no blob.
    fn load_params(
        user: &str,
        store: &mut Box<dyn ParamBlobStore>,
    ) -> std::result::Result<Option<UserParams>, StoreError> {
        let blob = store.load(user).map_err(|e| StoreError::Load {
            user: user.to_string(),
            detail: e.to_string(),
        })?;
        let Some(blob) = blob else {
            return Ok(None);
        };
        bartrack_config::from_blob(&blob)
            .map(Some)
            .map_err(|e| StoreError::Decode {
                user: user.to_string(),
                detail: e.to_string(),
            })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The live in-memory bundle. Always valid to read, even when every
    /// persist so far has failed.
    pub fn params(&self) -> &UserParams {
        &self.snapshot
    }

    /// Replace the bundle. The snapshot updates synchronously; persistence
    /// is queued and failures only warn. Invalid bundles are refused.
    pub fn save(&mut self, params: UserParams) -> Result<()> {
        if let Err(e) = params.validate() {
            return Err(e.wrap_err("params rejected"));
        }
        self.snapshot = params;
        match bartrack_config::to_blob(&params) {
            Ok(blob) => {
                if let Some(jobs) = &self.jobs
                    && jobs.try_send(blob).is_err()
                {
                    tracing::warn!(user = %self.user, "persist queue full, write skipped");
                }
            }
            Err(e) => {
                let err = StoreError::Encode {
                    user: self.user.clone(),
                    detail: e.to_string(),
                };
                tracing::warn!(error = %err, "write skipped");
            }
        }
        Ok(())
    }
}

impl Drop for ParamRepository {
    fn drop(&mut self) {
        // Closing the channel drains the worker; join so queued writes land.
        drop(self.jobs.take());
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.join()
        {
            tracing::warn!(?e, "params persist worker panicked during shutdown");
        }
    }
}

/// One TOML file per user under a directory. Writes land through a staged
/// sibling file and a rename, so a crash mid-write leaves the previous blob
/// intact.
#[derive(Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, user: &str) -> PathBuf {
        // Users name their profiles; keep the filename inert.
        let safe: String = user
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.toml"))
    }

    fn stage_and_swap(&self, user: &str, blob: &[u8]) -> std::io::Result<()> {
        use std::io::Write;
        std::fs::create_dir_all(&self.dir)?;
        let target = self.path_for(user);
        let staged = target.with_extension("toml.staged");
        let mut file = std::fs::File::create(&staged)?;
        file.write_all(blob)?;
        // Durable before it becomes visible under the real name.
        file.sync_all()?;
        drop(file);
        std::fs::rename(staged, target)
    }
}

impl ParamBlobStore for FileBlobStore {
    fn load(&mut self, user: &str) -> std::result::Result<Option<Vec<u8>>, bartrack_traits::BoxError> {
        match std::fs::read(self.path_for(user)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    fn save(&mut self, user: &str, blob: &[u8]) -> std::result::Result<(), bartrack_traits::BoxError> {
        self.stage_and_swap(user, blob)?;
        Ok(())
    }
}

/// Volatile store for tests and calibration dry-runs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParamBlobStore for MemoryBlobStore {
    fn load(&mut self, user: &str) -> std::result::Result<Option<Vec<u8>>, bartrack_traits::BoxError> {
        Ok(self.blobs.get(user).cloned())
    }

    fn save(&mut self, user: &str, blob: &[u8]) -> std::result::Result<(), bartrack_traits::BoxError> {
        self.blobs.insert(user.to_string(), blob.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;
    impl ParamBlobStore for FailingStore {
        fn load(
            &mut self,
            _user: &str,
        ) -> std::result::Result<Option<Vec<u8>>, bartrack_traits::BoxError> {
            Err("backing store offline".into())
        }
        fn save(
            &mut self,
            _user: &str,
            _blob: &[u8],
        ) -> std::result::Result<(), bartrack_traits::BoxError> {
            Err("backing store offline".into())
        }
    }

    #[test]
    fn failed_load_falls_back_to_defaults() {
        let repo = ParamRepository::open("lifter", Box::new(FailingStore));
        assert_eq!(*repo.params(), UserParams::default());
    }

    #[test]
    fn failed_save_keeps_in_memory_snapshot() {
        let mut repo = ParamRepository::open("lifter", Box::new(FailingStore));
        let mut params = UserParams::default();
        params.workout.rest_timer_s = 120;
        repo.save(params).unwrap();
        assert_eq!(repo.params().workout.rest_timer_s, 120);
    }

    #[test]
    fn invalid_params_are_refused() {
        let mut repo = ParamRepository::open("lifter", Box::new(MemoryBlobStore::new()));
        let mut params = UserParams::default();
        params.ekf.rv = -1.0;
        assert!(repo.save(params).is_err());
        assert_eq!(repo.params().ekf.rv, bartrack_config::EkfParams::default().rv);
    }

    #[test]
    fn corrupt_blob_loads_defaults() {
        let mut store = MemoryBlobStore::new();
        store.save("lifter", b"\xff\xfenot toml").unwrap();
        let repo = ParamRepository::open("lifter", Box::new(store));
        assert_eq!(*repo.params(), UserParams::default());
    }

    #[test]
    fn load_failures_carry_the_typed_error() {
        let mut store: Box<dyn ParamBlobStore> = Box::new(FailingStore);
        let err = ParamRepository::load_params("lifter", &mut store).unwrap_err();
        assert!(matches!(err, StoreError::Load { .. }));
        assert!(err.to_string().contains("backing store offline"));

        let mut store: Box<dyn ParamBlobStore> = Box::new(MemoryBlobStore::new());
        store.save("lifter", b"rep = [broken").unwrap();
        let err = ParamRepository::load_params("lifter", &mut store).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }
}
