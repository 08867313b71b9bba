use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::AuthProvider;
use crate::cache::QueryClient;

/// A token obtained by refresh that is rejected again within this window is
/// not refreshed a second time.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that reacts to 401 responses.
///
/// The `ApiClient` signals the notifier whenever a request is rejected as
/// unauthorized. The coordinator then refreshes the token once (bursts of
/// 401s collapse into a single wakeup) and, on success, invalidates the whole
/// query cache so active views refetch with the new token.
///
/// If the backend also rejects the freshly refreshed token, the coordinator
/// stops there: it logs that the user must sign in again and does not refresh
/// or invalidate until `MIN_REFRESH_INTERVAL` has passed or the token changes.
pub struct RefreshCoordinator {
    notify: Arc<Notify>,
    refreshes: watch::Receiver<u64>,
    rejected: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl RefreshCoordinator {
    /// Spawn the coordinator on the current runtime.
    pub fn spawn(auth: Arc<dyn AuthProvider>, cache: QueryClient) -> Self {
        let notify = Arc::new(Notify::new());
        let (count_tx, refreshes) = watch::channel(0u64);
        let (rejected_tx, rejected) = watch::channel(false);
        let signal = Arc::clone(&notify);

        let task = tokio::spawn(async move {
            // Token handed out by the last successful refresh, and when.
            let mut last: Option<(String, Instant)> = None;
            loop {
                signal.notified().await;
                if cache.is_closed() {
                    break;
                }

                let current = auth.access_token();
                let just_refreshed = matches!(
                    (&last, &current),
                    (Some((token, at)), Some(now)) if token == now && at.elapsed() < MIN_REFRESH_INTERVAL
                );
                if just_refreshed {
                    if !*rejected_tx.borrow() {
                        warn!("Refreshed token was rejected; sign in again");
                    }
                    rejected_tx.send_replace(true);
                    debug!("Skipping refresh of a token that was just issued");
                    continue;
                }

                match auth.refresh().await {
                    Ok(token) => {
                        last = Some((token, Instant::now()));
                        rejected_tx.send_replace(false);
                        let invalidated = cache.invalidate_all();
                        info!(invalidated, "Access token refreshed");
                        count_tx.send_modify(|n| *n += 1);
                    }
                    Err(e) => {
                        rejected_tx.send_replace(true);
                        warn!(error = %e, "Token refresh failed; sign in again");
                    }
                }
            }
        });

        Self {
            notify,
            refreshes,
            rejected,
            task,
        }
    }

    /// Handle to pass to `ApiClient::with_unauthorized_notifier`.
    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// Number of successful refreshes so far.
    pub fn refresh_count(&self) -> u64 {
        *self.refreshes.borrow()
    }

    /// True once the backend has rejected the session beyond what a refresh
    /// can fix. Cleared by the next successful refresh.
    pub fn needs_sign_in(&self) -> bool {
        *self.rejected.borrow()
    }

    /// Wait for the next successful refresh.
    pub async fn refreshed(&mut self) -> Option<u64> {
        self.refreshes.changed().await.ok()?;
        Some(*self.refreshes.borrow_and_update())
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        self.task.abort();
    }
}
