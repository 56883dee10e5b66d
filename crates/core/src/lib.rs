pub mod config;
pub mod domain;
pub mod errors;

pub use domain::call::{
    AgentAction, CallRecord, CallSid, CallStatus, ConversationTurn, ProviderCallStatus, Role,
};
pub use domain::menu::{
    CategoryId, DietaryRestriction, DietaryRestrictionType, Ingredient, MenuCategory, MenuItem,
    MenuItemId, OrderLine, OrderSummary, SpecialPricing,
};
pub use domain::reservation::{
    BookingPolicy, NewReservation, OpeningHours, Reservation, ReservationId, ReservationStatus,
    RestaurantTable, TableId,
};
pub use domain::restaurant::RestaurantProfile;
pub use errors::{ApplicationError, DomainError, InterfaceError};
