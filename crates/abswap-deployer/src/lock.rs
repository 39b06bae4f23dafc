//! Environment-scoped advisory lock
//!
//! A run holds environment `svc` while the object `svc.lock` exists in the
//! lock store. Acquire checks for the object and writes it; release deletes
//! it unconditionally. This is not linearizable (two runs can race between
//! check and put) and does nothing to stop changes made outside abswap; it
//! exists so two pipelines do not swap the same environment at once.
//!
//! Use [`LockManager::with_lock`] so the lock is released on every exit path
//! of the guarded work, including timeouts and interrupts.

use crate::error::{DeployError, LockOperation};
use abswap_common::lock_key;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, error, info, warn};

/// Key-value object store holding lock markers.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait LockStore: Send + Sync {
    /// Create or overwrite an object
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Delete an object; deleting a missing object is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Object body, or `None` if the object does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Body of a lock object.
///
/// Informational only: presence of the object is what holds the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMarker {
    pub run_id: String,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockMarker {
    pub fn new(run_id: &str) -> Self {
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
        Self {
            run_id: run_id.to_string(),
            holder: format!("{user}@{host}"),
            acquired_at: Utc::now(),
        }
    }
}

/// Acquires and releases environment locks in a [`LockStore`].
pub struct LockManager<S> {
    store: S,
    run_id: String,
}

impl<S: LockStore> LockManager<S> {
    pub fn new(store: S, run_id: impl Into<String>) -> Self {
        Self {
            store,
            run_id: run_id.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Whether the lock object for `environment` exists.
    pub async fn is_locked(&self, environment: &str) -> Result<bool, DeployError> {
        let key = lock_key(environment);
        let keys = self
            .store
            .list(&key)
            .await
            .map_err(|e| DeployError::lock_store(environment, LockOperation::Check, e))?;

        Ok(keys.iter().any(|k| *k == key))
    }

    /// Take the lock, failing immediately if another run holds it.
    pub async fn acquire(&self, environment: &str) -> Result<(), DeployError> {
        let key = lock_key(environment);

        if self.is_locked(environment).await? {
            return Err(DeployError::LockContention {
                environment: environment.to_string(),
                key,
            });
        }

        let body = serde_json::to_vec(&LockMarker::new(&self.run_id)).map_err(|e| {
            DeployError::lock_store(environment, LockOperation::Acquire, e.into())
        })?;

        self.store
            .put(&key, body)
            .await
            .map_err(|e| DeployError::lock_store(environment, LockOperation::Acquire, e))?;

        info!(environment = %environment, key = %key, run_id = %self.run_id, "Environment locked");
        Ok(())
    }

    /// Drop the lock unconditionally.
    pub async fn release(&self, environment: &str) -> Result<(), DeployError> {
        let key = lock_key(environment);

        self.store
            .delete(&key)
            .await
            .map_err(|e| DeployError::lock_store(environment, LockOperation::Release, e))?;

        info!(environment = %environment, key = %key, "Environment unlocked");
        Ok(())
    }

    /// Current lock marker, if the lock is held and its body is readable.
    pub async fn holder(&self, environment: &str) -> Result<Option<LockMarker>, DeployError> {
        let body = self
            .store
            .get(&lock_key(environment))
            .await
            .map_err(|e| DeployError::lock_store(environment, LockOperation::Read, e))?;

        Ok(body.and_then(|bytes| match serde_json::from_slice(&bytes) {
            Ok(marker) => Some(marker),
            Err(e) => {
                debug!(environment = %environment, error = %e, "Lock object has no readable marker");
                None
            }
        }))
    }

    /// Run `body` while holding the lock for `environment`.
    ///
    /// `body` is not polled unless the lock was acquired. The lock is
    /// released whether `body` succeeds or fails. If release fails after a
    /// successful body, the release error is returned; if both fail, the
    /// body's error wins and the release failure is logged.
    pub async fn with_lock<T, Fut>(&self, environment: &str, body: Fut) -> Result<T, DeployError>
    where
        Fut: Future<Output = Result<T, DeployError>>,
    {
        self.acquire(environment).await?;

        let result = body.await;
        let released = self.release(environment).await;

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => {
                error!(
                    environment = %environment,
                    error = %release_err,
                    "Run succeeded but the environment lock could not be released"
                );
                Err(release_err)
            }
            (Err(run_err), Ok(())) => Err(run_err),
            (Err(run_err), Err(release_err)) => {
                warn!(
                    environment = %environment,
                    key = %lock_key(environment),
                    error = %release_err,
                    "Failed to release environment lock after a failed run; remove it with `abswap unlock`"
                );
                Err(run_err)
            }
        }
    }
}
