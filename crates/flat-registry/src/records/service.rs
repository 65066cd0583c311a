use std::sync::Arc;

use tracing::{error, info, warn};

use super::domain::{
    Email, Flat, FlatId, FlatStatus, House, HouseId, NewFlat, NewHouse, UserRole, ValidationError,
};
use super::moderation::{ModerationCoordinator, ModerationError, RequestContext};
use super::repository::{FlatRepository, HouseRepository, StorageError};
use crate::notifications::{FlatNotice, NotificationDispatcher};

/// Flat creation and moderation.
#[derive(Clone)]
pub struct FlatService {
    flats: Arc<dyn FlatRepository>,
    coordinator: ModerationCoordinator,
    dispatcher: NotificationDispatcher,
}

impl FlatService {
    pub fn new(flats: Arc<dyn FlatRepository>, dispatcher: NotificationDispatcher) -> Self {
        let coordinator = ModerationCoordinator::new(Arc::clone(&flats));
        Self {
            flats,
            coordinator,
            dispatcher,
        }
    }

    /// Persists a flat in `created` and schedules subscriber notifications
    /// without waiting for them.
    pub async fn create(&self, flat: NewFlat) -> Result<Flat, RecordServiceError> {
        flat.validate()?;
        info!(
            house_id = %flat.house_id,
            flat_number = flat.flat_number,
            "creating flat"
        );

        let stored = self.flats.insert(flat).await.map_err(|err| {
            warn!(error = %err, "failed to create flat");
            RecordServiceError::from(err)
        })?;

        self.dispatcher.dispatch(FlatNotice::from(&stored));
        Ok(stored)
    }

    pub async fn get(&self, id: FlatId) -> Result<Flat, RecordServiceError> {
        Ok(self.flats.fetch(id).await?)
    }

    pub async fn transition(
        &self,
        ctx: &RequestContext,
        id: FlatId,
        status: FlatStatus,
    ) -> Result<Flat, RecordServiceError> {
        info!(flat_id = %id, status = %status, "switching flat status");
        self.coordinator
            .transition(ctx, id, status)
            .await
            .map_err(|err| {
                if err.is_integrity_alarm() {
                    error!(
                        flat_id = %id,
                        alert = "data_integrity",
                        error = %err,
                        "flat transition left inconsistent state"
                    );
                } else {
                    warn!(flat_id = %id, error = %err, "flat transition failed");
                }
                RecordServiceError::Moderation(err)
            })
    }
}

/// House records and subscriptions.
#[derive(Clone)]
pub struct HouseService {
    houses: Arc<dyn HouseRepository>,
}

impl HouseService {
    pub fn new(houses: Arc<dyn HouseRepository>) -> Self {
        Self { houses }
    }

    pub async fn create(&self, house: NewHouse) -> Result<House, RecordServiceError> {
        house.validate()?;
        info!(address = %house.address, "creating house");
        Ok(self.houses.insert(house).await?)
    }

    pub async fn get(&self, id: HouseId) -> Result<House, RecordServiceError> {
        Ok(self.houses.fetch(id).await?)
    }

    /// Flats of a house visible to `viewer`.
    pub async fn flats(
        &self,
        id: HouseId,
        viewer: UserRole,
    ) -> Result<Vec<Flat>, RecordServiceError> {
        info!(house_id = %id, viewer = ?viewer, "collecting house flats");
        let flats = self.houses.flats(id).await?;
        Ok(flats
            .into_iter()
            .filter(|flat| viewer.can_see(flat.status))
            .collect())
    }

    pub async fn subscribe(&self, id: HouseId, email: &str) -> Result<Email, RecordServiceError> {
        let email = Email::parse(email)?;
        info!(house_id = %id, email = %email, "subscribing to house");
        self.houses.subscribe(id, email.clone()).await?;
        Ok(email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(StorageError),
    #[error(transparent)]
    AlreadyExists(StorageError),
    #[error(transparent)]
    Storage(StorageError),
    #[error(transparent)]
    Moderation(#[from] ModerationError),
}

impl From<StorageError> for RecordServiceError {
    fn from(value: StorageError) -> Self {
        match value {
            err if err.is_not_found() => Self::NotFound(err),
            conflict @ StorageError::Conflict(_) => Self::AlreadyExists(conflict),
            other => Self::Storage(other),
        }
    }
}
