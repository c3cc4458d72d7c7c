//! The connection pool (component K, §4.10): shares [`Connection`]s by
//! parameter equality, reference-counts acquisitions, and idle-reaps cached
//! entries nobody holds.
//!
//! The pool does not schedule its own sweeps — per §5's clock collaborator,
//! something else (the embedder's event loop) calls [`Pool::sweep`]
//! periodically, at half the configured `sharing_timeout`.

use std::{collections::HashMap, future::Future};

use crate::{
    connection::{AuthCredential, Connection, ConnectionParameters},
    crypto::hostkey::HostKeyDatabase,
    error::Error,
    transport::Phase,
};

struct Entry<S> {
    connection: Connection<S>,
    refcount: u32,
    sharing_enabled: bool,
    consecutive_idle_sweeps: u32,
}

/// Whether an idle cache entry survives one more sweep, given its current
/// idle-sweep streak. Pulled out of [`Pool::sweep`] as a pure function since
/// [`Entry`] itself can't be constructed without a live connection.
fn survives_sweep(refcount: u32, consecutive_idle_sweeps: u32) -> (bool, u32) {
    if refcount > 0 {
        return (true, 0);
    }

    let streak = consecutive_idle_sweeps + 1;
    (streak < 2, streak)
}

/// A cache of shared [`Connection`]s, keyed by [`ConnectionParameters`]
/// equality plus a caller-supplied sharing flag (§4.10's supplement: a cached
/// *acquired* connection is reused only if its sharing flag still matches the
/// caller's current setting, not just its parameters).
pub struct Pool<S> {
    entries: HashMap<ConnectionParameters, Entry<S>>,
}

impl<S> Default for Pool<S> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<S> Pool<S>
where
    S: futures::AsyncRead + futures::AsyncWrite + Unpin,
{
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a handle to a cached, still-established connection matching
    /// `params` and `sharing_enabled`, incrementing its refcount; otherwise
    /// obtain a stream via `connect` and establish a fresh one (cached only
    /// when `sharing_enabled`).
    pub async fn acquire<F, Fut>(
        &mut self,
        params: ConnectionParameters,
        sharing_enabled: bool,
        host_keys: Box<dyn HostKeyDatabase>,
        credential: AuthCredential<'_>,
        connect: F,
    ) -> Result<Connection<S>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, Error>>,
    {
        if let Some(entry) = self.entries.get_mut(&params) {
            if entry.sharing_enabled == sharing_enabled
                && !entry.connection.is_deprecated()
                && entry.connection.phase() == Phase::ConnectionEstablished
            {
                entry.refcount += 1;
                entry.consecutive_idle_sweeps = 0;
                return Ok(entry.connection.clone());
            }
        }

        let stream = connect().await?;
        let connection = Connection::connect(stream, params.clone(), host_keys, credential).await?;

        if sharing_enabled {
            self.entries.insert(
                params,
                Entry {
                    connection: connection.clone(),
                    refcount: 1,
                    sharing_enabled,
                    consecutive_idle_sweeps: 0,
                },
            );
        }

        Ok(connection)
    }

    /// Release one acquisition. When the refcount reaches zero, a still-live
    /// connection goes back in the cache to await the next acquire or a
    /// sweep; a deprecated or disconnected one is dropped immediately.
    pub fn release(&mut self, params: &ConnectionParameters) {
        let Some(entry) = self.entries.get_mut(params) else {
            return;
        };

        entry.refcount = entry.refcount.saturating_sub(1);

        if entry.refcount == 0 && (entry.connection.is_deprecated() || entry.connection.phase() != Phase::ConnectionEstablished) {
            self.entries.remove(params);
        }
    }

    /// Evict the cached entry for `params`, marking every outstanding handle
    /// to it deprecated so the next `acquire` establishes a fresh connection.
    pub fn force_new_connection(&mut self, params: &ConnectionParameters) {
        if let Some(entry) = self.entries.remove(params) {
            entry.connection.mark_deprecated();
        }
    }

    /// Drop cache entries that have sat at refcount zero for two consecutive
    /// sweeps, resetting the streak for anything still held.
    pub fn sweep(&mut self) {
        self.entries.retain(|_, entry| {
            let (keep, streak) = survives_sweep(entry.refcount, entry.consecutive_idle_sweeps);
            entry.consecutive_idle_sweeps = streak;
            keep
        });
    }

    /// The number of entries currently cached (acquired or idle).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_acquired_entry_always_survives_a_sweep() {
        let (keep, streak) = survives_sweep(1, 0);
        assert!(keep);
        assert_eq!(streak, 0);
    }

    #[test]
    fn an_idle_entry_survives_its_first_sweep_but_not_its_second() {
        let (keep_first, streak) = survives_sweep(0, 0);
        assert!(keep_first);
        assert_eq!(streak, 1);

        let (keep_second, streak) = survives_sweep(0, streak);
        assert!(!keep_second);
        assert_eq!(streak, 2);
    }

    #[test]
    fn re_acquiring_an_idle_entry_resets_its_streak() {
        let (_, streak_after_one_sweep) = survives_sweep(0, 0);
        assert_eq!(streak_after_one_sweep, 1);

        let (keep, streak_after_reacquire) = survives_sweep(1, streak_after_one_sweep);
        assert!(keep);
        assert_eq!(streak_after_reacquire, 0);
    }

    #[test]
    fn a_new_pool_is_empty() {
        let pool: Pool<async_std::net::TcpStream> = Pool::new();
        assert!(pool.is_empty());
        assert_eq!(pool.len(), 0);
    }
}
