use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::notifications::{
    DrainTracker, FlatNotice, NotificationDispatcher, Notifier, NotifyError,
};
use crate::records::domain::{
    Email, Flat, FlatId, FlatStatus, House, HouseId, NewFlat, NewHouse,
};
use crate::records::memory::InMemoryRecordStore;
use crate::records::moderation::RequestContext;
use crate::records::repository::{
    FlatRepository, HouseRepository, StatusGuard, StatusWrite, StorageError,
};
use crate::records::service::{FlatService, HouseService};

/// Flat store that can fail or stall selected status writes.
#[derive(Default)]
pub(super) struct FaultyFlats {
    pub(super) inner: Arc<InMemoryRecordStore>,
    failing_targets: Mutex<HashMap<FlatStatus, StorageError>>,
    lock_hold: Mutex<Option<Duration>>,
    cancel_after_lock: Mutex<Option<RequestContext>>,
    cancel_on_failure: Mutex<Option<RequestContext>>,
    rival_after_lock: Mutex<Option<FlatStatus>>,
    rival_on_failure: Mutex<Option<FlatStatus>>,
    panic_target: Mutex<Option<FlatStatus>>,
    writes: Mutex<Vec<FlatStatus>>,
}

impl FaultyFlats {
    pub(super) fn over(inner: Arc<InMemoryRecordStore>) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub(super) fn fail_writes_to(&self, status: FlatStatus, error: StorageError) {
        self.failing_targets
            .lock()
            .expect("lock")
            .insert(status, error);
    }

    pub(super) fn hold_lock_for(&self, hold: Duration) {
        *self.lock_hold.lock().expect("lock") = Some(hold);
    }

    pub(super) fn cancel_after_lock(&self, ctx: RequestContext) {
        *self.cancel_after_lock.lock().expect("lock") = Some(ctx);
    }

    pub(super) fn cancel_on_injected_failure(&self, ctx: RequestContext) {
        *self.cancel_on_failure.lock().expect("lock") = Some(ctx);
    }

    /// Another writer replaces `moderating` with `status` right after the lock is taken.
    pub(super) fn overwrite_after_lock(&self, status: FlatStatus) {
        *self.rival_after_lock.lock().expect("lock") = Some(status);
    }

    /// Another writer releases the lock to `status` while an injected failure is returned.
    pub(super) fn release_on_injected_failure(&self, status: FlatStatus) {
        *self.rival_on_failure.lock().expect("lock") = Some(status);
    }

    pub(super) fn panic_on_write_to(&self, status: FlatStatus) {
        *self.panic_target.lock().expect("lock") = Some(status);
    }

    /// Writes bypassing the moderation lock, as a second process would.
    async fn rival_write(&self, id: FlatId, status: FlatStatus) -> Result<(), StorageError> {
        self.inner
            .write_status(id, StatusGuard::Is(FlatStatus::Moderating), status)
            .await
            .map(|_| ())
    }

    pub(super) fn writes(&self) -> Vec<FlatStatus> {
        self.writes.lock().expect("lock").clone()
    }
}

#[async_trait]
impl FlatRepository for FaultyFlats {
    async fn insert(&self, flat: NewFlat) -> Result<Flat, StorageError> {
        FlatRepository::insert(self.inner.as_ref(), flat).await
    }

    async fn fetch(&self, id: FlatId) -> Result<Flat, StorageError> {
        FlatRepository::fetch(self.inner.as_ref(), id).await
    }

    async fn status(&self, id: FlatId) -> Result<FlatStatus, StorageError> {
        self.inner.status(id).await
    }

    async fn write_status(
        &self,
        id: FlatId,
        guard: StatusGuard,
        status: FlatStatus,
    ) -> Result<StatusWrite, StorageError> {
        self.writes.lock().expect("lock").push(status);
        let panic_target = *self.panic_target.lock().expect("lock");
        if panic_target == Some(status) {
            panic!("storage adapter crashed writing '{status}'");
        }
        let injected = self
            .failing_targets
            .lock()
            .expect("lock")
            .get(&status)
            .cloned();
        if let Some(err) = injected {
            let pending_cancel = self.cancel_on_failure.lock().expect("lock").take();
            if let Some(ctx) = pending_cancel {
                ctx.cancel();
            }
            let rival = self.rival_on_failure.lock().expect("lock").take();
            if let Some(rival) = rival {
                self.rival_write(id, rival).await?;
            }
            return Err(err);
        }

        let outcome = self.inner.write_status(id, guard, status).await?;
        if status == FlatStatus::Moderating && matches!(outcome, StatusWrite::Applied { .. }) {
            let pending_cancel = self.cancel_after_lock.lock().expect("lock").take();
            if let Some(ctx) = pending_cancel {
                ctx.cancel();
            }
            let hold = *self.lock_hold.lock().expect("lock");
            if let Some(hold) = hold {
                tokio::time::sleep(hold).await;
            }
            let rival = self.rival_after_lock.lock().expect("lock").take();
            if let Some(rival) = rival {
                self.rival_write(id, rival).await?;
            }
        }
        Ok(outcome)
    }
}

/// Notifier recording every delivery, failing for selected recipients.
#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<(Email, FlatNotice)>>,
    failing: BTreeSet<String>,
    latency: Option<Duration>,
}

impl RecordingNotifier {
    pub(super) fn failing_for(recipients: &[&str]) -> Self {
        Self {
            failing: recipients.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(super) fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub(super) fn sent(&self) -> Vec<(Email, FlatNotice)> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &Email, notice: &FlatNotice) -> Result<(), NotifyError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.sent
            .lock()
            .expect("lock")
            .push((recipient.clone(), notice.clone()));
        if self.failing.contains(recipient.as_str()) {
            return Err(NotifyError::Rejected(recipient.to_string()));
        }
        Ok(())
    }
}

pub(super) fn riverside() -> NewHouse {
    NewHouse {
        address: "12 Riverside Ave".to_string(),
        year: 2004,
        developer: Some("Northline".to_string()),
    }
}

pub(super) fn new_flat(house_id: HouseId, flat_number: u32) -> NewFlat {
    NewFlat {
        house_id,
        flat_number,
        price: 120_000,
        rooms: 3,
    }
}

pub(super) struct Harness {
    pub(super) store: Arc<InMemoryRecordStore>,
    pub(super) flats: Arc<FaultyFlats>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) drain: DrainTracker,
    pub(super) flat_service: FlatService,
    pub(super) house_service: HouseService,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::with_notifier(RecordingNotifier::default())
    }

    pub(super) fn with_notifier(notifier: RecordingNotifier) -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        let flats = Arc::new(FaultyFlats::over(store.clone()));
        let notifier = Arc::new(notifier);
        let drain = DrainTracker::new();
        let dispatcher =
            NotificationDispatcher::new(store.clone(), notifier.clone(), drain.clone());
        let flat_service = FlatService::new(flats.clone(), dispatcher);
        let house_service = HouseService::new(store.clone());
        Self {
            store,
            flats,
            notifier,
            drain,
            flat_service,
            house_service,
        }
    }

    pub(super) async fn house(&self) -> House {
        self.house_service
            .create(riverside())
            .await
            .expect("house created")
    }

    /// Seeds a flat directly in the store with the given status.
    pub(super) async fn flat_in(
        &self,
        house_id: HouseId,
        number: u32,
        status: FlatStatus,
    ) -> Flat {
        let flat = FlatRepository::insert(self.store.as_ref(), new_flat(house_id, number))
            .await
            .expect("flat inserted");
        if status != FlatStatus::Created {
            self.store
                .write_status(flat.id, StatusGuard::Not(status), status)
                .await
                .expect("status seeded");
        }
        FlatRepository::fetch(self.store.as_ref(), flat.id)
            .await
            .expect("flat present")
    }

    pub(super) async fn status_of(&self, id: FlatId) -> FlatStatus {
        self.store.status(id).await.expect("flat present")
    }

    pub(super) async fn subscribe(&self, house_id: HouseId, emails: &[&str]) {
        for email in emails {
            self.house_service
                .subscribe(house_id, email)
                .await
                .expect("subscribed");
        }
    }
}

/// House store whose subscriber lookup always fails.
pub(super) struct UnreachableSubscribers;

#[async_trait]
impl HouseRepository for UnreachableSubscribers {
    async fn insert(&self, _house: NewHouse) -> Result<House, StorageError> {
        Err(StorageError::Unavailable("offline".to_string()))
    }

    async fn fetch(&self, id: HouseId) -> Result<House, StorageError> {
        Err(StorageError::HouseNotFound(id))
    }

    async fn flats(&self, id: HouseId) -> Result<Vec<Flat>, StorageError> {
        Err(StorageError::HouseNotFound(id))
    }

    async fn subscribe(&self, _id: HouseId, _email: Email) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("offline".to_string()))
    }

    async fn subscribers(&self, _id: HouseId) -> Result<Vec<Email>, StorageError> {
        Err(StorageError::Unavailable("subscriber table offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body can be read");
    serde_json::from_slice(&body).expect("body is json")
}
