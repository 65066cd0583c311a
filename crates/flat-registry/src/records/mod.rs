//! Houses, flats, and subscriptions together with the flat moderation workflow.

pub mod domain;
pub mod memory;
pub mod moderation;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Email, Flat, FlatId, FlatStatus, House, HouseId, NewFlat, NewHouse, TargetStatus, UserRole,
    ValidationError,
};
pub use memory::InMemoryRecordStore;
pub use moderation::{
    CancelOnDrop, CompensationTrigger, Interruption, ModerationCoordinator, ModerationError,
    RequestContext,
};
pub use repository::{FlatRepository, HouseRepository, StatusGuard, StatusWrite, StorageError};
pub use router::{records_router, FlatUpdateRequest, RecordsState, SubscribeRequest, ROLE_HEADER};
pub use service::{FlatService, HouseService, RecordServiceError};
