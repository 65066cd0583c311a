use async_trait::async_trait;

use super::domain::{Email, Flat, FlatId, FlatStatus, House, HouseId, NewFlat, NewHouse};

/// Precondition a conditional status write checks against the stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusGuard {
    /// Write only if the current status equals the given one.
    Is(FlatStatus),
    /// Write only if the current status differs from the given one.
    Not(FlatStatus),
}

impl StatusGuard {
    pub fn admits(&self, current: FlatStatus) -> bool {
        match self {
            StatusGuard::Is(expected) => current == *expected,
            StatusGuard::Not(excluded) => current != *excluded,
        }
    }
}

/// Result of a conditional status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusWrite {
    Applied { previous: FlatStatus, flat: Flat },
    Rejected { current: FlatStatus },
}

/// Flat storage. Implementations must evaluate the guard and apply the write
/// of [`FlatRepository::write_status`] as one atomic step relative to every
/// other caller, including callers in other processes sharing the store.
#[async_trait]
pub trait FlatRepository: Send + Sync {
    async fn insert(&self, flat: NewFlat) -> Result<Flat, StorageError>;
    async fn fetch(&self, id: FlatId) -> Result<Flat, StorageError>;
    async fn status(&self, id: FlatId) -> Result<FlatStatus, StorageError>;
    async fn write_status(
        &self,
        id: FlatId,
        guard: StatusGuard,
        status: FlatStatus,
    ) -> Result<StatusWrite, StorageError>;
}

/// House and subscription storage.
#[async_trait]
pub trait HouseRepository: Send + Sync {
    async fn insert(&self, house: NewHouse) -> Result<House, StorageError>;
    async fn fetch(&self, id: HouseId) -> Result<House, StorageError>;
    async fn flats(&self, id: HouseId) -> Result<Vec<Flat>, StorageError>;
    async fn subscribe(&self, id: HouseId, email: Email) -> Result<(), StorageError>;
    async fn subscribers(&self, id: HouseId) -> Result<Vec<Email>, StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("flat {0} not found")]
    FlatNotFound(FlatId),
    #[error("house {0} not found")]
    HouseNotFound(HouseId),
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::FlatNotFound(_) | StorageError::HouseNotFound(_)
        )
    }
}
