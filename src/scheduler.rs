use crate::dashboard::{Dashboard, RefreshRequest};
use crate::models::DashboardView;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A running refresh task. Dropping the handle does not stop it; call `cancel`.
pub struct RefreshHandle {
    cancel_token: CancellationToken,
    task: JoinHandle<usize>,
}

impl RefreshHandle {
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Waits for the task to stop and returns how many refreshes it delivered.
    pub async fn join(self) -> usize {
        match self.task.await {
            Ok(count) => count,
            Err(error) => {
                tracing::error!(error = %error, "refresh task panicked");
                0
            }
        }
    }
}

/// Refreshes `request` on a fixed interval, handing each view to `sink`.
/// The first refresh runs immediately; a slow refresh delays the next tick
/// instead of overlapping it.
pub fn spawn_refresh_loop<F>(
    dashboard: Arc<Dashboard>,
    request: RefreshRequest,
    interval: Duration,
    mut sink: F,
) -> RefreshHandle
where
    F: FnMut(DashboardView) + Send + 'static,
{
    let cancel_token = CancellationToken::new();
    let loop_token = cancel_token.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut delivered = 0usize;

        loop {
            tokio::select! {
                _ = loop_token.cancelled() => {
                    tracing::info!(delivered, "refresh loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let dashboard = dashboard.clone();
                    let request = request.clone();
                    match tokio::task::spawn_blocking(move || dashboard.refresh(&request)).await {
                        Ok(view) => {
                            if loop_token.is_cancelled() {
                                break;
                            }
                            sink(view);
                            delivered += 1;
                        }
                        Err(error) => tracing::error!(error = %error, "refresh pass panicked"),
                    }
                }
            }
        }
        delivered
    });

    RefreshHandle { cancel_token, task }
}

#[cfg(test)]
mod tests {
    use super::spawn_refresh_loop;
    use crate::config::{DashboardConfig, SourceKind};
    use crate::dashboard::{Dashboard, RefreshRequest};
    use crate::models::DataFreshness;
    use crate::remote::local::LocalStore;
    use std::sync::{Arc, Mutex};
    use tokio::time::Duration;

    fn dashboard(root: &std::path::Path) -> Arc<Dashboard> {
        let config = DashboardConfig {
            source: SourceKind::Local,
            local_root: root.to_path_buf(),
            ..DashboardConfig::default()
        };
        Arc::new(Dashboard::new(config, Arc::new(LocalStore::new(root))))
    }

    #[tokio::test]
    async fn delivers_views_until_cancelled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let handle = spawn_refresh_loop(
            dashboard(dir.path()),
            RefreshRequest::Live,
            Duration::from_millis(20),
            move |view| sink_seen.lock().expect("seen").push(view.freshness),
        );

        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.cancel();
        let delivered = handle.join().await;

        let seen = seen.lock().expect("seen");
        assert!(delivered >= 2, "delivered {delivered}");
        assert_eq!(seen.len(), delivered);
        assert!(seen.iter().all(|freshness| *freshness == DataFreshness::Empty));
    }

    #[tokio::test]
    async fn cancelled_before_first_tick_delivers_nothing_more() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = spawn_refresh_loop(
            dashboard(dir.path()),
            RefreshRequest::Live,
            Duration::from_secs(3600),
            |_| {},
        );
        let token = handle.cancel_token();
        token.cancel();
        let delivered = handle.join().await;
        assert!(delivered <= 1);
    }
}
