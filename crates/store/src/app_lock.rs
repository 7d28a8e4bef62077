use crate::{Result, StoreError};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static APP_LOCK_WAIT_MS_LAST: AtomicU64 = AtomicU64::new(0);
static APP_LOCK_WAIT_MS_MAX: AtomicU64 = AtomicU64::new(0);

pub fn app_lock_wait_ms_last() -> u64 {
    APP_LOCK_WAIT_MS_LAST.load(Ordering::Relaxed)
}

pub fn app_lock_wait_ms_max() -> u64 {
    APP_LOCK_WAIT_MS_MAX.load(Ordering::Relaxed)
}

fn update_lock_wait_ms(wait_ms: u64) {
    APP_LOCK_WAIT_MS_LAST.store(wait_ms, Ordering::Relaxed);
    let mut current = APP_LOCK_WAIT_MS_MAX.load(Ordering::Relaxed);
    while wait_ms > current {
        match APP_LOCK_WAIT_MS_MAX.compare_exchange(
            current,
            wait_ms,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

/// How long to keep polling a contended application lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub retry_interval: Duration,
    pub timeout: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Exclusive advisory lock on an application's lock file. Released on drop.
///
/// The lock file itself is left in place: removing it while another process
/// waits on the same path would let both hold "the" lock on different inodes.
pub struct AppWriteLock {
    file: std::fs::File,
    path: PathBuf,
}

impl AppWriteLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AppWriteLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl std::fmt::Debug for AppWriteLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppWriteLock")
            .field("path", &self.path)
            .finish()
    }
}

pub async fn acquire_app_write_lock(path: &Path, options: LockOptions) -> Result<AppWriteLock> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let open_path = path.to_path_buf();
    let file = tokio::task::spawn_blocking(move || -> Result<std::fs::File> {
        use std::fs::OpenOptions;

        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&open_path)
            .map_err(|err| {
                StoreError::LockError(format!("open app lock {}: {err}", open_path.display()))
            })
    })
    .await
    .map_err(|err| StoreError::LockError(format!("join app lock task: {err}")))??;

    let start = Instant::now();
    let contended = fs2::lock_contended_error().kind();
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => break,
            Err(err) if err.kind() == contended => {
                if start.elapsed() >= options.timeout {
                    return Err(StoreError::LockError(format!(
                        "timed out after {} ms waiting for {}",
                        start.elapsed().as_millis(),
                        path.display()
                    )));
                }
                log::debug!("App lock {} is held elsewhere, retrying", path.display());
                tokio::time::sleep(options.retry_interval).await;
            }
            Err(err) => {
                return Err(StoreError::LockError(format!(
                    "acquire app lock {}: {err}",
                    path.display()
                )))
            }
        }
    }
    update_lock_wait_ms(u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX));

    Ok(AppWriteLock {
        file,
        path: path.to_path_buf(),
    })
}
