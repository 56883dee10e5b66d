use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use hostline_core::domain::call::{CallRecord, CallSid};
use hostline_core::domain::menu::{
    CategoryId, DietaryRestriction, DietaryRestrictionType, Ingredient, MenuCategory, MenuItem,
    MenuItemId, SpecialPricing,
};
use hostline_core::domain::reservation::{
    BookingPolicy, NewReservation, Reservation, ReservationId, ReservationStatus,
    RestaurantTable,
};

pub mod call_record;
pub mod codec;
pub mod memory;
pub mod menu;
pub mod reservation;

pub use call_record::SqlCallRecordRepository;
pub use memory::InMemoryCallRecordRepository;
pub use menu::SqlMenuRepository;
pub use reservation::SqlReservationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait MenuRepository: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<MenuCategory>, RepositoryError>;

    async fn list_items_by_category(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<MenuItem>, RepositoryError>;

    /// Case-insensitive substring match on item name, available items only.
    async fn search_items(&self, query: &str) -> Result<Vec<MenuItem>, RepositoryError>;

    async fn list_items_by_dietary_restriction(
        &self,
        restriction: DietaryRestrictionType,
    ) -> Result<Vec<MenuItem>, RepositoryError>;

    async fn find_item(&self, id: MenuItemId) -> Result<Option<MenuItem>, RepositoryError>;

    async fn dietary_restrictions_for_item(
        &self,
        id: MenuItemId,
    ) -> Result<Vec<DietaryRestriction>, RepositoryError>;

    async fn ingredients_for_item(&self, id: MenuItemId)
        -> Result<Vec<Ingredient>, RepositoryError>;

    /// Every special flagged active for the item, regardless of its date range.
    async fn specials_for_item(
        &self,
        id: MenuItemId,
    ) -> Result<Vec<SpecialPricing>, RepositoryError>;

    /// Specials running at `now`, ordered by item.
    async fn running_specials(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<SpecialPricing>, RepositoryError>;
}

/// Result of an atomic booking attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingOutcome {
    Booked(Reservation),
    SlotFull,
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Pending or confirmed reservations with `start <= reservation_at <= end`.
    async fn count_holding_slot(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<usize, RepositoryError>;

    /// Active tables seating `party_size` that no pending/confirmed booking in the window uses.
    async fn available_tables(
        &self,
        party_size: u32,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RestaurantTable>, RepositoryError>;

    /// Checks slot capacity, picks whatever free tables fit and inserts in one write
    /// transaction. A booking may carry no tables.
    async fn book(
        &self,
        request: &NewReservation,
        policy: &BookingPolicy,
        now: NaiveDateTime,
    ) -> Result<BookingOutcome, RepositoryError>;

    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, RepositoryError>;

    async fn upcoming_for_phone(
        &self,
        customer_phone: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<Reservation>, RepositoryError>;

    async fn update_status(
        &self,
        id: ReservationId,
        status: ReservationStatus,
        updated_at: NaiveDateTime,
    ) -> Result<(), RepositoryError>;

    async fn list_tables(&self) -> Result<Vec<RestaurantTable>, RepositoryError>;
}

#[async_trait]
pub trait CallRecordRepository: Send + Sync {
    /// Upserts the record and replaces its transcript and actions.
    ///
    /// A stored `completed` record is only replaced by another `completed` one. Returns
    /// `false` when the write was refused for that reason.
    async fn save(&self, record: &CallRecord) -> Result<bool, RepositoryError>;

    async fn find(&self, call_sid: &CallSid) -> Result<Option<CallRecord>, RepositoryError>;
}
