//! Function-calling tools the agent can invoke against the restaurant database.

pub mod menu;
pub mod pricing;
pub mod reservations;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{info, warn};

use hostline_core::domain::reservation::{BookingPolicy, Reservation};
use hostline_db::repositories::{MenuRepository, ReservationRepository};

use crate::llm::ToolSpec;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<Value>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Restaurant-local wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Hook fired after a reservation is confirmed, e.g. to text the caller.
#[async_trait]
pub trait ReservationNotifier: Send + Sync {
    async fn reservation_confirmed(&self, reservation: &Reservation) -> Result<()>;
}

/// Shared handles every restaurant tool works against.
#[derive(Clone)]
pub struct ToolContext {
    pub menu: Arc<dyn MenuRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub policy: BookingPolicy,
    pub clock: Arc<dyn Clock>,
    pub notifier: Option<Arc<dyn ReservationNotifier>>,
}

impl ToolContext {
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }
}

/// What a dispatch produced, as fed back to the model and recorded on the call.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutcome {
    pub result: Value,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// All thirteen restaurant tools bound to one context.
    pub fn restaurant(context: ToolContext) -> Self {
        let context = Arc::new(context);
        let mut registry = Self::default();

        registry.register(menu::GetMenuCategories::new(context.clone()));
        registry.register(menu::GetMenuItemsByCategory::new(context.clone()));
        registry.register(menu::SearchMenuItems::new(context.clone()));
        registry.register(menu::GetMenuItemsByDietaryRestriction::new(context.clone()));
        registry.register(menu::GetMenuItemDetails::new(context.clone()));
        registry.register(pricing::GetItemPrice::new(context.clone()));
        registry.register(pricing::GetSpecialPricing::new(context.clone()));
        registry.register(pricing::CalculateOrderTotal::new(context.clone()));
        registry.register(reservations::CheckReservationAvailability::new(context.clone()));
        registry.register(reservations::CreateReservation::new(context.clone()));
        registry.register(reservations::GetUpcomingReservations::new(context.clone()));
        registry.register(reservations::CancelReservation::new(context.clone()));
        registry.register(reservations::GetReservationById::new(context));
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Specs sorted by name so the prompt is stable across runs.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameters(),
            })
            .collect();
        specs.sort_by(|left, right| left.name.cmp(&right.name));
        specs
    }

    /// Never fails: unknown tools and tool errors come back as `{"error": ...}` payloads.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            let message = format!("Unknown tool: {name}");
            warn!(event_name = "system.agent.tool.unknown", tool = name, "unknown tool requested");
            return ToolOutcome { result: json!({ "error": message }), error: Some(message) };
        };

        match tool.execute(arguments).await {
            Ok(result) => {
                let error = result.get("error").and_then(Value::as_str).map(str::to_owned);
                info!(
                    event_name = "system.agent.tool.executed",
                    tool = name,
                    success = error.is_none(),
                    "tool executed"
                );
                ToolOutcome { result, error }
            }
            Err(error) => {
                let message = format!("{error:#}");
                warn!(
                    event_name = "system.agent.tool.failed",
                    tool = name,
                    error = %message,
                    "tool execution failed"
                );
                ToolOutcome { result: json!({ "error": message }), error: Some(message) }
            }
        }
    }
}

pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T> {
    serde_json::from_value(input).with_context(|| format!("invalid arguments for {tool}"))
}

/// Prices travel as JSON numbers; parsing the decimal text keeps `15.99` exact.
pub(crate) fn money(value: Decimal) -> Value {
    value.to_string().parse::<f64>().map_or(Value::Null, Value::from)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime};

    use hostline_core::domain::reservation::BookingPolicy;
    use hostline_db::repositories::{SqlMenuRepository, SqlReservationRepository};
    use hostline_db::{connect_with_settings, migrations, DbPool, RestaurantSeedDataset};

    use super::{FixedClock, ToolContext, ToolRegistry};

    pub fn seed_instant() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, 10)
            .and_then(|date| date.and_hms_opt(9, 30, 0))
            .expect("valid timestamp")
    }

    pub async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        RestaurantSeedDataset::load_at(&pool, seed_instant()).await.expect("seed");
        pool
    }

    pub fn context(pool: DbPool) -> ToolContext {
        ToolContext {
            menu: Arc::new(SqlMenuRepository::new(pool.clone())),
            reservations: Arc::new(SqlReservationRepository::new(pool)),
            policy: BookingPolicy::default(),
            clock: Arc::new(FixedClock(seed_instant())),
            notifier: None,
        }
    }

    pub async fn registry() -> ToolRegistry {
        ToolRegistry::restaurant(context(seeded_pool().await))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use super::test_support::registry;
    use super::{money, Tool, ToolRegistry};

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn description(&self) -> &'static str {
            "always fails"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _input: Value) -> Result<Value> {
            bail!("kitchen closed")
        }
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_payload() {
        let registry = ToolRegistry::default();
        let outcome = registry.dispatch("order_pizza", json!({})).await;

        assert_eq!(outcome.result, json!({"error": "Unknown tool: order_pizza"}));
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn tool_errors_are_wrapped_not_raised() {
        let mut registry = ToolRegistry::default();
        registry.register(Failing);

        let outcome = registry.dispatch("failing", json!({})).await;
        assert_eq!(outcome.result, json!({"error": "kitchen closed"}));
        assert_eq!(outcome.error.as_deref(), Some("kitchen closed"));
    }

    #[tokio::test]
    async fn restaurant_registry_advertises_every_tool_sorted() {
        let registry = registry().await;
        let names: Vec<String> = registry.specs().into_iter().map(|spec| spec.name).collect();

        assert_eq!(registry.len(), 13);
        assert_eq!(
            names,
            vec![
                "calculate_order_total",
                "cancel_reservation",
                "check_reservation_availability",
                "create_reservation",
                "get_item_price",
                "get_menu_categories",
                "get_menu_item_details",
                "get_menu_items_by_category",
                "get_menu_items_by_dietary_restriction",
                "get_reservation_by_id",
                "get_special_pricing",
                "get_upcoming_reservations",
                "search_menu_items",
            ]
        );
    }

    #[tokio::test]
    async fn malformed_arguments_surface_as_tool_error() {
        let registry = registry().await;
        let outcome = registry.dispatch("get_menu_items_by_category", json!({})).await;

        let message = outcome.error.expect("missing argument");
        assert!(message.starts_with("invalid arguments for get_menu_items_by_category"));
    }

    #[test]
    fn money_renders_as_json_number() {
        assert_eq!(money(Decimal::new(1399, 2)), json!(13.99));
    }
}
