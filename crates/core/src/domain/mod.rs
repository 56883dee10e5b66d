pub mod call;
pub mod menu;
pub mod reservation;
pub mod restaurant;
