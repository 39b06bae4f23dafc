//! S3 lock integration tests - actually call AWS APIs
//!
//! These tests are marked `#[ignore]` and only run with a scratch bucket:
//! ```
//! AWS_PROFILE=your_profile ABSWAP_TEST_LOCK_BUCKET=your-bucket \
//!     cargo test --test aws_lock_integration -- --ignored
//! ```

use abswap_deployer::DeployError;
use abswap_deployer::aws::{AwsContext, S3LockStore};
use abswap_deployer::lock::{LockManager, LockStore};
use abswap_test_utils::aws::{
    TEST_LOCK_BUCKET_VAR, get_test_region, test_environment_name, test_lock_bucket, test_lock_key,
};

async fn lock_store() -> S3LockStore {
    let bucket = test_lock_bucket()
        .unwrap_or_else(|| panic!("{TEST_LOCK_BUCKET_VAR} must name a scratch S3 bucket"));
    let region = get_test_region();
    let aws = AwsContext::new(Some(&region), None).await;
    S3LockStore::from_context(&aws, &bucket)
}

/// Acquire, observe, and release a lock in a real bucket
#[tokio::test]
#[ignore]
async fn test_lock_lifecycle() {
    let environment = test_environment_name();
    let locks = LockManager::new(lock_store().await, "integration-run");

    assert!(
        !locks
            .is_locked(&environment)
            .await
            .expect("AWS credentials required - set AWS_PROFILE or AWS_ACCESS_KEY_ID")
    );

    locks.acquire(&environment).await.expect("Should acquire lock");
    assert!(locks.is_locked(&environment).await.expect("Should list locks"));

    let marker = locks
        .holder(&environment)
        .await
        .expect("Should read lock")
        .expect("Lock should carry a marker");
    assert_eq!(marker.run_id, "integration-run");

    locks.release(&environment).await.expect("Should release lock");
    assert!(!locks.is_locked(&environment).await.expect("Should list locks"));
}

/// A second run is refused while the first holds the lock
#[tokio::test]
#[ignore]
async fn test_lock_contention() {
    let environment = test_environment_name();
    let first = LockManager::new(lock_store().await, "first-run");
    let second = LockManager::new(lock_store().await, "second-run");

    first.acquire(&environment).await.expect("Should acquire lock");

    let err = second
        .acquire(&environment)
        .await
        .expect_err("Second acquire should be refused");
    assert!(matches!(err, DeployError::LockContention { .. }));

    first.release(&environment).await.expect("Should release lock");
}

/// Reading and deleting a missing key are not errors
#[tokio::test]
#[ignore]
async fn test_missing_lock_object() {
    let store = lock_store().await;
    let key = test_lock_key(&test_environment_name());

    assert!(store.get(&key).await.expect("Should read").is_none());
    store.delete(&key).await.expect("Delete of missing key should succeed");
    assert!(store.list(&key).await.expect("Should list").is_empty());
}
