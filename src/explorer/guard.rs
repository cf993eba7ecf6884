// Path claims for mutations.
// A mutation claims every path it touches before issuing remote calls, and the
// claim is released when the returned `PathClaim` is dropped. Claims overlap
// when one path is the other or an ancestor of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::{ExplorerError, Result};

#[derive(Default, Clone)]
pub struct PathGuard {
    claimed: Arc<Mutex<Vec<String>>>,
}

/// Releases its paths on drop.
pub struct PathClaim {
    claimed: Arc<Mutex<Vec<String>>>,
    keys: Vec<String>,
}

fn lock(claimed: &Mutex<Vec<String>>) -> MutexGuard<'_, Vec<String>> {
    claimed.lock().unwrap_or_else(PoisonError::into_inner)
}

fn overlaps(a: &str, b: &str) -> bool {
    fn within(path: &str, ancestor: &str) -> bool {
        path.strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
    }
    a == b || within(a, b) || within(b, a)
}

impl PathGuard {
    /// Claims `paths` of `bucket_id`. An empty path claims the whole bucket.
    pub fn claim<I, P>(&self, bucket_id: &str, paths: I) -> Result<PathClaim>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut keys: Vec<String> = paths
            .into_iter()
            .map(|p| {
                let p = p.as_ref().trim_matches('/');
                if p.is_empty() {
                    bucket_id.to_string()
                } else {
                    format!("{}/{}", bucket_id, p)
                }
            })
            .collect();
        keys.sort();
        keys.dedup();

        let mut claimed = lock(&self.claimed);
        if let Some(busy) = keys
            .iter()
            .find(|k| claimed.iter().any(|c| overlaps(k, c)))
        {
            return Err(ExplorerError::PathBusy(busy.clone()));
        }
        debug!(paths = ?keys, "claimed");
        claimed.extend(keys.iter().cloned());
        Ok(PathClaim {
            claimed: Arc::clone(&self.claimed),
            keys,
        })
    }

    #[cfg(test)]
    fn is_idle(&self) -> bool {
        lock(&self.claimed).is_empty()
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        let mut claimed = lock(&self.claimed);
        for key in &self.keys {
            if let Some(pos) = claimed.iter().position(|c| c == key) {
                claimed.swap_remove(pos);
            }
        }
    }
}
