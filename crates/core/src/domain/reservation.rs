use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
pub const SLOT_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Canceled,
    Completed,
    NoShow,
}

impl ReservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Canceled => "canceled",
            Self::Completed => "completed",
            Self::NoShow => "no_show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "canceled" => Some(Self::Canceled),
            "completed" => Some(Self::Completed),
            "no_show" => Some(Self::NoShow),
            _ => None,
        }
    }

    /// Statuses that occupy a slot and a table.
    pub fn holds_slot(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantTable {
    pub id: TableId,
    pub table_number: i64,
    pub capacity: u32,
    pub location: Option<String>,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub party_size: u32,
    pub reservation_at: NaiveDateTime,
    pub special_requests: Option<String>,
    pub status: ReservationStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub tables: Vec<RestaurantTable>,
}

impl Reservation {
    pub fn cancel(&mut self, now: NaiveDateTime) -> Result<(), DomainError> {
        match self.status {
            ReservationStatus::Canceled => {
                return Err(DomainError::InvalidBookingRequest(
                    "Reservation is already canceled.".to_string(),
                ))
            }
            ReservationStatus::Completed | ReservationStatus::NoShow => {
                return Err(DomainError::InvalidReservationTransition {
                    from: self.status,
                    to: ReservationStatus::Canceled,
                })
            }
            ReservationStatus::Pending | ReservationStatus::Confirmed => {}
        }

        if self.reservation_at < now {
            return Err(DomainError::InvalidBookingRequest(
                "Cannot cancel a reservation that is in the past.".to_string(),
            ));
        }

        self.status = ReservationStatus::Canceled;
        self.updated_at = now;
        Ok(())
    }
}

/// Details needed to book a table; validated against [`BookingPolicy`] before persisting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub party_size: u32,
    pub reservation_at: NaiveDateTime,
    pub special_requests: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub open_hour: u32,
    pub close_hour: u32,
}

impl Default for OpeningHours {
    fn default() -> Self {
        Self { open_hour: 11, close_hour: 22 }
    }
}

impl OpeningHours {
    pub fn is_open_at(&self, at: NaiveDateTime) -> bool {
        let hour = at.hour();
        hour >= self.open_hour && hour < self.close_hour
    }

    /// `11:00 to 22:00`
    pub fn label_24h(&self) -> String {
        format!("{:02}:00 to {:02}:00", self.open_hour, self.close_hour)
    }

    /// `11:00 AM to 10:00 PM`
    pub fn label_12h(&self) -> String {
        format!("{} to {}", twelve_hour(self.open_hour), twelve_hour(self.close_hour))
    }
}

fn twelve_hour(hour: u32) -> String {
    let suffix = if hour % 24 < 12 { "AM" } else { "PM" };
    let display = match hour % 12 {
        0 => 12,
        other => other,
    };
    format!("{display}:00 {suffix}")
}

/// Slot rules for table bookings: opening hours, a +/- one hour occupancy window,
/// a cap on concurrent bookings per window, and the order alternatives are offered in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingPolicy {
    pub hours: OpeningHours,
    pub slot_capacity: usize,
    pub window: Duration,
    pub alternative_offsets_hours: Vec<i64>,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self::new(OpeningHours::default())
    }
}

impl BookingPolicy {
    pub fn new(hours: OpeningHours) -> Self {
        Self {
            hours,
            slot_capacity: 10,
            window: Duration::hours(1),
            alternative_offsets_hours: vec![-1, 1, -2, 2],
        }
    }

    pub fn window_around(&self, at: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        (at - self.window, at + self.window)
    }

    pub fn validate_request(
        &self,
        at: NaiveDateTime,
        party_size: u32,
        now: NaiveDateTime,
    ) -> Result<(), DomainError> {
        if party_size == 0 {
            return Err(DomainError::InvalidBookingRequest(
                "Party size must be at least 1.".to_string(),
            ));
        }
        if at < now {
            return Err(DomainError::InvalidBookingRequest(
                "Reservation must be in the future.".to_string(),
            ));
        }
        if !self.hours.is_open_at(at) {
            return Err(DomainError::InvalidBookingRequest(format!(
                "The restaurant is only open from {}.",
                self.hours.label_24h()
            )));
        }
        Ok(())
    }

    pub fn has_capacity(&self, bookings_in_window: usize) -> bool {
        bookings_in_window < self.slot_capacity
    }

    /// Candidate times to offer when `at` is full, already restricted to opening hours.
    pub fn alternative_candidates(&self, at: NaiveDateTime) -> Vec<NaiveDateTime> {
        self.alternative_offsets_hours
            .iter()
            .map(|offset| at + Duration::hours(*offset))
            .filter(|candidate| self.hours.is_open_at(*candidate))
            .collect()
    }

    /// Smallest tables first until the party is seated.
    pub fn assign_tables(
        &self,
        available: &[RestaurantTable],
        party_size: u32,
    ) -> Vec<RestaurantTable> {
        let mut sorted = available.to_vec();
        sorted.sort_by_key(|table| (table.capacity, table.table_number));

        let mut remaining = i64::from(party_size);
        let mut assigned = Vec::new();
        for table in sorted {
            if remaining <= 0 {
                break;
            }
            remaining -= i64::from(table.capacity);
            assigned.push(table);
        }
        assigned
    }
}

pub fn parse_booking_datetime(date: &str, time: &str) -> Result<NaiveDateTime, DomainError> {
    let invalid = || {
        DomainError::InvalidBookingRequest(
            "Invalid date or time format. Use YYYY-MM-DD for date and HH:MM for time.".to_string(),
        )
    };
    let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).map_err(|_| invalid())?;
    let time = NaiveTime::parse_from_str(time.trim(), TIME_FORMAT).map_err(|_| invalid())?;
    Ok(date.and_time(time))
}

pub fn format_slot(at: NaiveDateTime) -> String {
    at.format(SLOT_FORMAT).to_string()
}
