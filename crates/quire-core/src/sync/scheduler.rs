//! Background sync scheduling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::crypto::NoteCipher;

use super::{SyncConfig, SyncCoordinator, SyncTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Poke {
    LocalChange,
    SyncNow,
}

/// Cheap handle for asking the scheduler to sync.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    sender: mpsc::UnboundedSender<Poke>,
}

impl SyncTrigger {
    /// Report a local edit; bursts are coalesced into one sync.
    pub fn notify_local_change(&self) {
        self.sender.send(Poke::LocalChange).ok();
    }

    /// Sync immediately, starting with a queue resync.
    pub fn sync_now(&self) {
        self.sender.send(Poke::SyncNow).ok();
    }
}

/// Owns the periodic and debounced sync tasks for one coordinator.
///
/// Both tasks stop when the scheduler is dropped.
pub struct SyncScheduler {
    trigger: SyncTrigger,
    periodic: Option<JoinHandle<()>>,
    debounced: JoinHandle<()>,
}

impl SyncScheduler {
    /// Start scheduling syncs for `coordinator`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T, C>(coordinator: Arc<SyncCoordinator<T, C>>, config: &SyncConfig) -> Self
    where
        T: SyncTransport + 'static,
        C: NoteCipher + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();

        let periodic = config
            .sync_interval
            .map(|interval| tokio::spawn(run_periodic(coordinator.clone(), interval)));
        let debounced = tokio::spawn(run_debounced(
            coordinator,
            receiver,
            config.debounce,
            config.max_debounce_wait,
        ));

        tracing::debug!(
            interval = ?config.sync_interval,
            debounce = ?config.debounce,
            "Sync scheduler started"
        );
        Self {
            trigger: SyncTrigger { sender },
            periodic,
            debounced,
        }
    }

    /// A handle for requesting syncs
    #[must_use]
    pub fn trigger(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    /// Stop both tasks.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(periodic) = &self.periodic {
            periodic.abort();
        }
        self.debounced.abort();
        tracing::debug!("Sync scheduler stopped");
    }
}

async fn run_periodic<T, C>(coordinator: Arc<SyncCoordinator<T, C>>, interval: Duration)
where
    T: SyncTransport,
    C: NoteCipher,
{
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let outcome = coordinator.request_sync().await;
        tracing::trace!(?outcome, "Periodic sync finished");
    }
}

async fn run_debounced<T, C>(
    coordinator: Arc<SyncCoordinator<T, C>>,
    mut receiver: mpsc::UnboundedReceiver<Poke>,
    debounce: Duration,
    max_wait: Duration,
) where
    T: SyncTransport,
    C: NoteCipher,
{
    while let Some(poke) = receiver.recv().await {
        if poke == Poke::SyncNow {
            coordinator.force_queue_sync().await;
            continue;
        }

        let deadline = Instant::now() + max_wait;
        let mut quiet_until = Instant::now() + debounce;
        let mut force = false;
        loop {
            tokio::select! {
                () = time::sleep_until(quiet_until.min(deadline)) => break,
                poke = receiver.recv() => match poke {
                    Some(Poke::LocalChange) => quiet_until = Instant::now() + debounce,
                    Some(Poke::SyncNow) => {
                        force = true;
                        break;
                    }
                    None => break,
                },
            }
        }

        let outcome = if force {
            coordinator.force_queue_sync().await
        } else {
            coordinator.request_sync().await
        };
        tracing::trace!(?outcome, "Debounced sync finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptionKey;
    use crate::models::settings::SYNC_NUMBER;
    use crate::models::User;
    use crate::notify::NotificationBus;
    use crate::protocol::{
        DeltaSyncRequest, DeltaSyncResponse, QueueSyncRequest, QueueSyncResponse,
    };
    use crate::store::NoteStore;
    use crate::sync::SyncResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTransport {
        deltas: AtomicUsize,
        queues: AtomicUsize,
    }

    impl SyncTransport for CountingTransport {
        async fn delta_sync(
            &self,
            _token: &str,
            request: &DeltaSyncRequest,
        ) -> SyncResult<DeltaSyncResponse> {
            self.deltas.fetch_add(1, Ordering::SeqCst);
            Ok(DeltaSyncResponse::Ok {
                notes: Vec::new(),
                sync_number: request.sync_number + 1,
            })
        }

        async fn queue_sync(
            &self,
            _token: &str,
            request: &QueueSyncRequest,
        ) -> SyncResult<QueueSyncResponse> {
            self.queues.fetch_add(1, Ordering::SeqCst);
            Ok(QueueSyncResponse {
                note_heads: Vec::new(),
                sync_number: request.sync_number + 1,
            })
        }
    }

    async fn coordinator() -> Arc<SyncCoordinator<CountingTransport>> {
        let store = NoteStore::open_in_memory().unwrap();
        store
            .sign_in(&User {
                username: "alice".to_string(),
                token: "device".to_string(),
                encryption_key: EncryptionKey::generate().to_base64(),
                demo: false,
            })
            .await
            .unwrap();
        store.set_setting(&SYNC_NUMBER, &1).await.unwrap();
        Arc::new(SyncCoordinator::new(
            store,
            CountingTransport::default(),
            NotificationBus::new(),
        ))
    }

    fn config() -> SyncConfig {
        SyncConfig::new("http://localhost")
            .unwrap()
            .without_periodic_sync()
            .with_debounce(Duration::from_millis(100), Duration::from_millis(300))
    }

    fn deltas(coordinator: &SyncCoordinator<CountingTransport>) -> usize {
        coordinator.transport().deltas.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn bursts_of_changes_coalesce_into_one_sync() {
        let coordinator = coordinator().await;
        let config = config().with_debounce(Duration::from_millis(100), Duration::from_secs(5));
        let scheduler = SyncScheduler::start(coordinator.clone(), &config);
        let trigger = scheduler.trigger();

        for _ in 0..5 {
            trigger.notify_local_change();
            time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(deltas(&coordinator), 0);

        time::sleep(Duration::from_millis(400)).await;
        assert_eq!(deltas(&coordinator), 1);
        assert_eq!(coordinator.transport().queues.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn continuous_changes_sync_at_max_wait() {
        let coordinator = coordinator().await;
        let scheduler = SyncScheduler::start(coordinator.clone(), &config());
        let trigger = scheduler.trigger();

        for _ in 0..10 {
            trigger.notify_local_change();
            time::sleep(Duration::from_millis(50)).await;
        }
        assert!(deltas(&coordinator) >= 1);
    }

    #[tokio::test]
    async fn sync_now_forces_queue_resync() {
        let coordinator = coordinator().await;
        let scheduler = SyncScheduler::start(coordinator.clone(), &config());

        scheduler.trigger().sync_now();
        time::sleep(Duration::from_millis(100)).await;

        assert_eq!(coordinator.transport().queues.load(Ordering::SeqCst), 1);
        assert_eq!(deltas(&coordinator), 1);
    }

    #[tokio::test]
    async fn periodic_ticks_until_shutdown() {
        let coordinator = coordinator().await;
        let config = config().with_sync_interval(Duration::from_millis(100));
        let scheduler = SyncScheduler::start(coordinator.clone(), &config);

        time::sleep(Duration::from_millis(350)).await;
        assert!(deltas(&coordinator) >= 2);

        scheduler.shutdown();
        time::sleep(Duration::from_millis(20)).await;
        let after_shutdown = deltas(&coordinator);
        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(deltas(&coordinator), after_shutdown);
    }
}
