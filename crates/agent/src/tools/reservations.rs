use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use hostline_core::domain::reservation::{
    format_slot, parse_booking_datetime, NewReservation, Reservation, ReservationId, DATE_FORMAT,
    TIME_FORMAT,
};
use hostline_db::repositories::BookingOutcome;

use super::menu::context_constructor;
use super::{parse_args, Tool, ToolContext};

const NO_AVAILABILITY: &str = "No availability for the requested time and party size.";

pub struct CheckReservationAvailability {
    context: Arc<ToolContext>,
}

pub struct CreateReservation {
    context: Arc<ToolContext>,
}

pub struct GetUpcomingReservations {
    context: Arc<ToolContext>,
}

pub struct CancelReservation {
    context: Arc<ToolContext>,
}

pub struct GetReservationById {
    context: Arc<ToolContext>,
}

context_constructor!(
    CheckReservationAvailability,
    CreateReservation,
    GetUpcomingReservations,
    CancelReservation,
    GetReservationById,
);

#[derive(Deserialize)]
struct SlotArgs {
    date: String,
    time: String,
    party_size: u32,
}

#[derive(Deserialize)]
struct BookingArgs {
    date: String,
    time: String,
    party_size: u32,
    customer_name: String,
    customer_phone: String,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    special_requests: Option<String>,
}

#[derive(Deserialize)]
struct PhoneArgs {
    customer_phone: String,
}

#[derive(Deserialize)]
struct ReservationArgs {
    reservation_id: i64,
}

impl ToolContext {
    /// Whether the slot window around `at` still takes bookings.
    async fn slot_open(&self, at: NaiveDateTime) -> Result<bool> {
        let (start, end) = self.policy.window_around(at);
        let holding = self.reservations.count_holding_slot(start, end).await?;
        Ok(self.policy.has_capacity(holding))
    }

    async fn alternatives(&self, at: NaiveDateTime) -> Result<Vec<String>> {
        let now = self.now();
        let mut open = Vec::new();
        for candidate in self.policy.alternative_candidates(at) {
            if candidate > now && self.slot_open(candidate).await? {
                open.push(format_slot(candidate));
            }
        }
        Ok(open)
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_owned()).filter(|text| !text.is_empty())
}

fn reservation_details(reservation: &Reservation) -> Value {
    json!({
        "id": reservation.id.0,
        "customer_name": reservation.customer_name,
        "customer_phone": reservation.customer_phone,
        "customer_email": reservation.customer_email,
        "party_size": reservation.party_size,
        "date": reservation.reservation_at.format(DATE_FORMAT).to_string(),
        "time": reservation.reservation_at.format(TIME_FORMAT).to_string(),
        "special_requests": reservation.special_requests,
        "status": reservation.status.as_str(),
        "tables": reservation
            .tables
            .iter()
            .map(|table| json!({
                "id": table.id.0,
                "table_number": table.table_number,
                "capacity": table.capacity,
                "location": table.location,
            }))
            .collect::<Vec<_>>(),
        "created_at": reservation.created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "updated_at": reservation.updated_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
    })
}

#[async_trait]
impl Tool for CheckReservationAvailability {
    fn name(&self) -> &'static str {
        "check_reservation_availability"
    }

    fn description(&self) -> &'static str {
        "Check if there is availability for a reservation"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "date": {"type": "string", "description": "The reservation date (YYYY-MM-DD)"},
                "time": {"type": "string", "description": "The reservation time (HH:MM)"},
                "party_size": {"type": "integer", "description": "The party size"}
            },
            "required": ["date", "time", "party_size"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: SlotArgs = parse_args(self.name(), input)?;
        let context = &self.context;

        let at = match parse_booking_datetime(&args.date, &args.time).and_then(|at| {
            context.policy.validate_request(at, args.party_size, context.now()).map(|()| at)
        }) {
            Ok(at) => at,
            Err(error) => return Ok(json!({"available": false, "error": error.to_string()})),
        };

        if !context.slot_open(at).await? {
            return Ok(json!({
                "available": false,
                "error": NO_AVAILABILITY,
                "alternatives": context.alternatives(at).await?,
            }));
        }

        let (start, end) = context.policy.window_around(at);
        let tables = context.reservations.available_tables(args.party_size, start, end).await?;

        Ok(json!({
            "available": true,
            "date": at.format(DATE_FORMAT).to_string(),
            "time": at.format(TIME_FORMAT).to_string(),
            "party_size": args.party_size,
            "available_tables": tables
                .iter()
                .map(|table| json!({
                    "id": table.id.0,
                    "table_number": table.table_number,
                    "capacity": table.capacity,
                    "location": table.location,
                }))
                .collect::<Vec<_>>(),
        }))
    }
}

#[async_trait]
impl Tool for CreateReservation {
    fn name(&self) -> &'static str {
        "create_reservation"
    }

    fn description(&self) -> &'static str {
        "Create a new reservation"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "date": {"type": "string", "description": "The reservation date (YYYY-MM-DD)"},
                "time": {"type": "string", "description": "The reservation time (HH:MM)"},
                "party_size": {"type": "integer", "description": "The party size"},
                "customer_name": {"type": "string", "description": "The customer name"},
                "customer_phone": {"type": "string", "description": "The customer phone number"},
                "customer_email": {"type": "string", "description": "The customer email (optional)"},
                "special_requests": {"type": "string", "description": "Special requests (optional)"}
            },
            "required": ["date", "time", "party_size", "customer_name", "customer_phone"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: BookingArgs = parse_args(self.name(), input)?;
        let context = &self.context;
        let now = context.now();

        let at = match parse_booking_datetime(&args.date, &args.time)
            .and_then(|at| context.policy.validate_request(at, args.party_size, now).map(|()| at))
        {
            Ok(at) => at,
            Err(error) => return Ok(json!({"success": false, "error": error.to_string()})),
        };

        let request = NewReservation {
            customer_name: args.customer_name.trim().to_owned(),
            customer_phone: args.customer_phone.trim().to_owned(),
            customer_email: optional_text(args.customer_email),
            party_size: args.party_size,
            reservation_at: at,
            special_requests: optional_text(args.special_requests),
        };

        let reservation = match context.reservations.book(&request, &context.policy, now).await? {
            BookingOutcome::Booked(reservation) => reservation,
            BookingOutcome::SlotFull => {
                return Ok(json!({
                    "success": false,
                    "error": NO_AVAILABILITY,
                    "alternatives": context.alternatives(at).await?,
                }));
            }
        };

        info!(
            event_name = "system.agent.reservation.created",
            reservation_id = reservation.id.0,
            party_size = reservation.party_size,
            slot = %format_slot(reservation.reservation_at),
            "reservation confirmed"
        );
        if let Some(notifier) = &context.notifier {
            if let Err(error) = notifier.reservation_confirmed(&reservation).await {
                warn!(
                    event_name = "system.agent.reservation.notify_failed",
                    reservation_id = reservation.id.0,
                    error = %error,
                    "reservation confirmation could not be delivered"
                );
            }
        }

        Ok(json!({
            "success": true,
            "reservation_id": reservation.id.0,
            "customer_name": reservation.customer_name,
            "date": reservation.reservation_at.format(DATE_FORMAT).to_string(),
            "time": reservation.reservation_at.format(TIME_FORMAT).to_string(),
            "party_size": reservation.party_size,
            "tables": reservation
                .tables
                .iter()
                .map(|table| json!({
                    "table_number": table.table_number,
                    "capacity": table.capacity,
                    "location": table.location,
                }))
                .collect::<Vec<_>>(),
            "status": reservation.status.as_str(),
        }))
    }
}

#[async_trait]
impl Tool for GetUpcomingReservations {
    fn name(&self) -> &'static str {
        "get_upcoming_reservations"
    }

    fn description(&self) -> &'static str {
        "List a caller's upcoming confirmed reservations by phone number"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "customer_phone": {"type": "string", "description": "The customer phone number"}
            },
            "required": ["customer_phone"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: PhoneArgs = parse_args(self.name(), input)?;
        let upcoming = self
            .context
            .reservations
            .upcoming_for_phone(args.customer_phone.trim(), self.context.now())
            .await?;

        Ok(upcoming
            .iter()
            .map(|reservation| {
                json!({
                    "id": reservation.id.0,
                    "date": reservation.reservation_at.format(DATE_FORMAT).to_string(),
                    "time": reservation.reservation_at.format(TIME_FORMAT).to_string(),
                    "party_size": reservation.party_size,
                    "special_requests": reservation.special_requests,
                    "tables": reservation
                        .tables
                        .iter()
                        .map(|table| json!({
                            "table_number": table.table_number,
                            "location": table.location,
                        }))
                        .collect::<Vec<_>>(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl Tool for CancelReservation {
    fn name(&self) -> &'static str {
        "cancel_reservation"
    }

    fn description(&self) -> &'static str {
        "Cancel an existing reservation"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reservation_id": {"type": "integer", "description": "The ID of the reservation"}
            },
            "required": ["reservation_id"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: ReservationArgs = parse_args(self.name(), input)?;
        let id = ReservationId(args.reservation_id);
        let Some(mut reservation) = self.context.reservations.find_by_id(id).await? else {
            return Ok(json!({
                "success": false,
                "error": format!("Reservation with ID {} not found.", args.reservation_id),
            }));
        };

        let now = self.context.now();
        if let Err(error) = reservation.cancel(now) {
            return Ok(json!({"success": false, "error": error.to_string()}));
        }
        self.context.reservations.update_status(id, reservation.status, now).await?;

        info!(
            event_name = "system.agent.reservation.canceled",
            reservation_id = id.0,
            "reservation canceled"
        );
        Ok(json!({
            "success": true,
            "reservation_id": id.0,
            "customer_name": reservation.customer_name,
            "date": reservation.reservation_at.format(DATE_FORMAT).to_string(),
            "time": reservation.reservation_at.format(TIME_FORMAT).to_string(),
            "status": reservation.status.as_str(),
        }))
    }
}

#[async_trait]
impl Tool for GetReservationById {
    fn name(&self) -> &'static str {
        "get_reservation_by_id"
    }

    fn description(&self) -> &'static str {
        "Get details of a specific reservation"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reservation_id": {"type": "integer", "description": "The ID of the reservation"}
            },
            "required": ["reservation_id"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: ReservationArgs = parse_args(self.name(), input)?;
        let reservation =
            self.context.reservations.find_by_id(ReservationId(args.reservation_id)).await?;
        Ok(reservation.as_ref().map_or(Value::Null, reservation_details))
    }
}
