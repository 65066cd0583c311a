use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::domain::{Email, Flat, FlatId, FlatStatus, House, HouseId, NewFlat, NewHouse};
use super::repository::{FlatRepository, HouseRepository, StatusGuard, StatusWrite, StorageError};

#[derive(Debug, Default)]
struct StoreState {
    next_house: u64,
    next_flat: u64,
    houses: BTreeMap<HouseId, House>,
    flats: BTreeMap<FlatId, Flat>,
    subscriptions: BTreeMap<HouseId, BTreeSet<Email>>,
}

/// Process-local store backing both repository ports with a single mutex.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: Mutex<StoreState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Unavailable("record store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl FlatRepository for InMemoryRecordStore {
    async fn insert(&self, flat: NewFlat) -> Result<Flat, StorageError> {
        let mut state = self.lock()?;
        if !state.houses.contains_key(&flat.house_id) {
            return Err(StorageError::HouseNotFound(flat.house_id));
        }

        let duplicate = state
            .flats
            .values()
            .any(|stored| stored.house_id == flat.house_id && stored.flat_number == flat.flat_number);
        if duplicate {
            return Err(StorageError::Conflict(format!(
                "flat {} in house {}",
                flat.flat_number, flat.house_id
            )));
        }

        state.next_flat += 1;
        let stored = Flat {
            id: FlatId(state.next_flat),
            house_id: flat.house_id,
            flat_number: flat.flat_number,
            price: flat.price,
            rooms: flat.rooms,
            status: FlatStatus::Created,
        };
        state.flats.insert(stored.id, stored.clone());
        if let Some(house) = state.houses.get_mut(&flat.house_id) {
            house.updated_at = Utc::now();
        }
        Ok(stored)
    }

    async fn fetch(&self, id: FlatId) -> Result<Flat, StorageError> {
        let state = self.lock()?;
        state
            .flats
            .get(&id)
            .cloned()
            .ok_or(StorageError::FlatNotFound(id))
    }

    async fn status(&self, id: FlatId) -> Result<FlatStatus, StorageError> {
        let state = self.lock()?;
        state
            .flats
            .get(&id)
            .map(|flat| flat.status)
            .ok_or(StorageError::FlatNotFound(id))
    }

    async fn write_status(
        &self,
        id: FlatId,
        guard: StatusGuard,
        status: FlatStatus,
    ) -> Result<StatusWrite, StorageError> {
        let mut state = self.lock()?;
        let flat = state
            .flats
            .get_mut(&id)
            .ok_or(StorageError::FlatNotFound(id))?;

        if !guard.admits(flat.status) {
            return Ok(StatusWrite::Rejected {
                current: flat.status,
            });
        }

        let previous = flat.status;
        flat.status = status;
        Ok(StatusWrite::Applied {
            previous,
            flat: flat.clone(),
        })
    }
}

#[async_trait]
impl HouseRepository for InMemoryRecordStore {
    async fn insert(&self, house: NewHouse) -> Result<House, StorageError> {
        let mut state = self.lock()?;
        let duplicate = state
            .houses
            .values()
            .any(|stored| stored.address.eq_ignore_ascii_case(house.address.trim()));
        if duplicate {
            return Err(StorageError::Conflict(format!("house at {}", house.address)));
        }

        state.next_house += 1;
        let now = Utc::now();
        let stored = House {
            id: HouseId(state.next_house),
            address: house.address.trim().to_string(),
            year: house.year,
            developer: house.developer,
            created_at: now,
            updated_at: now,
        };
        state.houses.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn fetch(&self, id: HouseId) -> Result<House, StorageError> {
        let state = self.lock()?;
        state
            .houses
            .get(&id)
            .cloned()
            .ok_or(StorageError::HouseNotFound(id))
    }

    async fn flats(&self, id: HouseId) -> Result<Vec<Flat>, StorageError> {
        let state = self.lock()?;
        if !state.houses.contains_key(&id) {
            return Err(StorageError::HouseNotFound(id));
        }
        Ok(state
            .flats
            .values()
            .filter(|flat| flat.house_id == id)
            .cloned()
            .collect())
    }

    async fn subscribe(&self, id: HouseId, email: Email) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if !state.houses.contains_key(&id) {
            return Err(StorageError::HouseNotFound(id));
        }
        let subscribers = state.subscriptions.entry(id).or_default();
        if !subscribers.insert(email.clone()) {
            return Err(StorageError::Conflict(format!(
                "{email} already subscribed to house {id}"
            )));
        }
        Ok(())
    }

    async fn subscribers(&self, id: HouseId) -> Result<Vec<Email>, StorageError> {
        let state = self.lock()?;
        if !state.houses.contains_key(&id) {
            return Err(StorageError::HouseNotFound(id));
        }
        Ok(state
            .subscriptions
            .get(&id)
            .map(|emails| emails.iter().cloned().collect())
            .unwrap_or_default())
    }
}
