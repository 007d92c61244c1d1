use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future;
use tokio::fs;
use tokio::runtime;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::artifact::Artifact;
use super::config::{LocalPolicy, ManifestConfiguration};
use super::error::ValidationError;
use super::key_resolver;
use super::storage::{ObjectStore, S3Store};
use super::Error;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GetManifestResult;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreManifestResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Transferred,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    config: ManifestConfiguration,
    artifacts: Vec<Artifact>,
}

impl Manifest {
    pub fn new(config: ManifestConfiguration, artifacts: Vec<Artifact>) -> Self {
        Manifest { config, artifacts }
    }

    pub fn from_env(artifacts: Vec<Artifact>) -> Result<Self, ValidationError> {
        Ok(Self::new(ManifestConfiguration::from_env()?, artifacts))
    }

    pub fn config(&self) -> &ManifestConfiguration {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ManifestConfiguration {
        &mut self.config
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Downloads every artifact with one S3 client shared by the batch.
    pub async fn get(&self) -> Result<GetManifestResult, Error> {
        let store = S3Store::from_config(&self.config);
        self.get_with(&store).await
    }

    /// Uploads every artifact with one S3 client shared by the batch.
    pub async fn store(&self) -> Result<StoreManifestResult, Error> {
        let store = S3Store::from_config(&self.config);
        self.store_with(&store).await
    }

    /// Runs the sequential download on a private current-thread runtime.
    /// Must not be called from inside another tokio runtime.
    pub fn get_blocking(&self) -> Result<GetManifestResult, Error> {
        let store = S3Store::from_config(&self.config);
        self.get_blocking_with(&store)
    }

    /// Runs the sequential upload on a private current-thread runtime.
    /// Must not be called from inside another tokio runtime.
    pub fn store_blocking(&self) -> Result<StoreManifestResult, Error> {
        let store = S3Store::from_config(&self.config);
        self.store_blocking_with(&store)
    }

    pub fn get_blocking_with<S>(&self, store: &S) -> Result<GetManifestResult, Error>
    where
        S: ObjectStore + ?Sized,
    {
        let rt = runtime::Builder::new_current_thread().enable_all().build()?;
        rt.block_on(self.get_sequential_with(store))
    }

    pub fn store_blocking_with<S>(&self, store: &S) -> Result<StoreManifestResult, Error>
    where
        S: ObjectStore + ?Sized,
    {
        let rt = runtime::Builder::new_current_thread().enable_all().build()?;
        rt.block_on(self.store_sequential_with(store))
    }

    /// Downloads all artifacts concurrently, at most `max_concurrent` in flight.
    ///
    /// Every per-artifact future is built before any of them runs; the
    /// semaphore only bounds the transfers themselves. The first failure
    /// aborts the batch and is returned as is.
    pub async fn get_with<S>(&self, store: &S) -> Result<GetManifestResult, Error>
    where
        S: ObjectStore + ?Sized,
    {
        let sem = Semaphore::new(self.config.max_concurrent());
        let done = AtomicUsize::new(0);
        let total = self.artifacts.len();
        let (sem, done) = (&sem, &done);
        let units: Vec<_> = self
            .artifacts
            .iter()
            .map(|artifact| async move {
                let outcome = self.get_artifact(store, artifact, Some(sem)).await?;
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                self.log_get(n, total, artifact, outcome);
                Ok::<_, Error>(())
            })
            .collect();
        future::try_join_all(units).await?;
        info!(bucket = self.config.bucket(), total, "manifest downloaded");
        Ok(GetManifestResult)
    }

    /// Uploads all artifacts concurrently, at most `max_concurrent` in flight.
    pub async fn store_with<S>(&self, store: &S) -> Result<StoreManifestResult, Error>
    where
        S: ObjectStore + ?Sized,
    {
        let sem = Semaphore::new(self.config.max_concurrent());
        let done = AtomicUsize::new(0);
        let total = self.artifacts.len();
        let (sem, done) = (&sem, &done);
        let units: Vec<_> = self
            .artifacts
            .iter()
            .map(|artifact| async move {
                self.put_artifact(store, artifact, Some(sem)).await?;
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                self.log_store(n, total, artifact);
                Ok::<_, Error>(())
            })
            .collect();
        future::try_join_all(units).await?;
        info!(bucket = self.config.bucket(), total, "manifest stored");
        Ok(StoreManifestResult)
    }

    /// Downloads the artifacts one at a time, in list order.
    pub async fn get_sequential_with<S>(&self, store: &S) -> Result<GetManifestResult, Error>
    where
        S: ObjectStore + ?Sized,
    {
        let total = self.artifacts.len();
        for (i, artifact) in self.artifacts.iter().enumerate() {
            let outcome = self.get_artifact(store, artifact, None).await?;
            self.log_get(i + 1, total, artifact, outcome);
        }
        info!(bucket = self.config.bucket(), total, "manifest downloaded");
        Ok(GetManifestResult)
    }

    /// Uploads the artifacts one at a time, in list order.
    pub async fn store_sequential_with<S>(&self, store: &S) -> Result<StoreManifestResult, Error>
    where
        S: ObjectStore + ?Sized,
    {
        let total = self.artifacts.len();
        for (i, artifact) in self.artifacts.iter().enumerate() {
            self.put_artifact(store, artifact, None).await?;
            self.log_store(i + 1, total, artifact);
        }
        info!(bucket = self.config.bucket(), total, "manifest stored");
        Ok(StoreManifestResult)
    }

    fn resolve(&self, artifact: &Artifact) -> (String, PathBuf) {
        (
            key_resolver::remote_key(self.config.remote_prefix(), artifact.name()),
            key_resolver::local_path(self.config.local_prefix(), artifact.path()),
        )
    }

    async fn get_artifact<S>(
        &self,
        store: &S,
        artifact: &Artifact,
        sem: Option<&Semaphore>,
    ) -> Result<Outcome, Error>
    where
        S: ObjectStore + ?Sized,
    {
        let (key, path) = self.resolve(artifact);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let keep_existing = match self.config.local_policy() {
            LocalPolicy::Overwrite => false,
            LocalPolicy::Skip => fs::metadata(&path).await.is_ok(),
        };
        if keep_existing {
            return Ok(Outcome::Skipped);
        }
        let _permit = match sem {
            Some(sem) => Some(sem.acquire().await?),
            None => None,
        };
        store.download(self.config.bucket(), &key, &path).await?;
        Ok(Outcome::Transferred)
    }

    async fn put_artifact<S>(
        &self,
        store: &S,
        artifact: &Artifact,
        sem: Option<&Semaphore>,
    ) -> Result<(), Error>
    where
        S: ObjectStore + ?Sized,
    {
        let (key, path) = self.resolve(artifact);
        let _permit = match sem {
            Some(sem) => Some(sem.acquire().await?),
            None => None,
        };
        store.upload(self.config.bucket(), &key, &path).await
    }

    fn log_get(&self, n: usize, total: usize, artifact: &Artifact, outcome: Outcome) {
        let (key, path) = self.resolve(artifact);
        match outcome {
            Outcome::Transferred => {
                debug!(%key, path = %path.display(), "downloaded {}/{}", n, total)
            }
            Outcome::Skipped => {
                debug!(%key, path = %path.display(), "skipped existing file {}/{}", n, total)
            }
        }
    }

    fn log_store(&self, n: usize, total: usize, artifact: &Artifact) {
        let (key, path) = self.resolve(artifact);
        debug!(%key, path = %path.display(), "uploaded {}/{}", n, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, String, PathBuf)>>,
    }

    #[async_trait]
    impl ObjectStore for Recorder {
        async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), Error> {
            self.calls
                .lock()
                .unwrap()
                .push((bucket.to_owned(), key.to_owned(), dest.to_owned()));
            fs::write(dest, key).await?;
            Ok(())
        }

        async fn upload(&self, bucket: &str, key: &str, src: &Path) -> Result<(), Error> {
            fs::metadata(src).await?;
            self.calls
                .lock()
                .unwrap()
                .push((bucket.to_owned(), key.to_owned(), src.to_owned()));
            Ok(())
        }
    }

    fn manifest(local_prefix: &Path, policy: LocalPolicy) -> Manifest {
        let config = ManifestConfiguration::new("bucket")
            .unwrap()
            .with_remote_prefix("runs/1/")
            .with_local_prefix(local_prefix.to_str().unwrap())
            .with_local_policy(policy);
        Manifest::new(
            config,
            vec![
                Artifact::new("model", "out/nested/model.bin").unwrap(),
                Artifact::new("vocab", "vocab.txt").unwrap(),
            ],
        )
    }

    #[tokio::test]
    async fn get_resolves_keys_and_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest(dir.path(), LocalPolicy::Overwrite);
        let store = Recorder::default();
        manifest.get_sequential_with(&store).await.unwrap();

        let calls = store.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                (
                    "bucket".to_owned(),
                    "runs/1/model".to_owned(),
                    dir.path().join("out/nested/model.bin"),
                ),
                (
                    "bucket".to_owned(),
                    "runs/1/vocab".to_owned(),
                    dir.path().join("vocab.txt"),
                ),
            ]
        );
        let content = std::fs::read_to_string(dir.path().join("out/nested/model.bin")).unwrap();
        assert_eq!(content, "runs/1/model");
    }

    #[tokio::test]
    async fn skip_policy_only_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vocab.txt"), "existing content").unwrap();
        let manifest = manifest(dir.path(), LocalPolicy::Skip);
        let store = Recorder::default();
        manifest.get_with(&store).await.unwrap();

        let keys: Vec<_> = store.calls.lock().unwrap().iter().map(|c| c.1.clone()).collect();
        assert_eq!(keys, vec!["runs/1/model".to_owned()]);
        let content = std::fs::read_to_string(dir.path().join("vocab.txt")).unwrap();
        assert_eq!(content, "existing content");
    }

    #[tokio::test]
    async fn policy_can_change_between_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = manifest(dir.path(), LocalPolicy::Skip);
        let store = Recorder::default();
        manifest.get_with(&store).await.unwrap();
        manifest.get_with(&store).await.unwrap();
        assert_eq!(store.calls.lock().unwrap().len(), 2);

        manifest.config_mut().set_local_policy(LocalPolicy::Overwrite);
        manifest.get_with(&store).await.unwrap();
        assert_eq!(store.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn store_fails_on_a_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest(dir.path(), LocalPolicy::Overwrite);
        let store = Recorder::default();
        let err = manifest.store_sequential_with(&store).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(store.calls.lock().unwrap().is_empty());
    }
}
