use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use hostline_core::domain::menu::{
    active_special, current_price, MenuItemId, OrderLine, OrderSummary,
};

use super::menu::context_constructor;
use super::{money, parse_args, Tool, ToolContext};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct GetItemPrice {
    context: Arc<ToolContext>,
}

pub struct GetSpecialPricing {
    context: Arc<ToolContext>,
}

pub struct CalculateOrderTotal {
    context: Arc<ToolContext>,
}

context_constructor!(GetItemPrice, GetSpecialPricing, CalculateOrderTotal);

#[derive(Deserialize)]
struct ItemArgs {
    item_id: i64,
}

#[derive(Deserialize)]
struct OrderArgs {
    items: Vec<OrderEntry>,
}

#[derive(Deserialize)]
struct OrderEntry {
    id: i64,
    #[serde(default = "one")]
    quantity: u32,
}

fn one() -> u32 {
    1
}

#[async_trait]
impl Tool for GetItemPrice {
    fn name(&self) -> &'static str {
        "get_item_price"
    }

    fn description(&self) -> &'static str {
        "Get price information for a menu item"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "item_id": {"type": "integer", "description": "The ID of the menu item"}
            },
            "required": ["item_id"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: ItemArgs = parse_args(self.name(), input)?;
        let Some(item) = self.context.menu.find_item(MenuItemId(args.item_id)).await? else {
            return Ok(Value::Null);
        };

        let now = self.context.now();
        let specials = self.context.menu.specials_for_item(item.id).await?;
        let running = active_special(item.id, &specials, now);

        let mut price = json!({
            "id": item.id.0,
            "name": item.name,
            "regular_price": money(item.price),
            "current_price": money(current_price(&item, &specials, now)),
            "has_special_pricing": running.is_some(),
        });
        if let Some(special) = running {
            price["special_pricing"] = json!({
                "price": money(special.special_price),
                "description": special.description,
                "start_date": special.start_at.format(TIMESTAMP_FORMAT).to_string(),
                "end_date": special.end_at.format(TIMESTAMP_FORMAT).to_string(),
            });
            price["savings"] = money(special.savings(item.price));
        }
        Ok(price)
    }
}

#[async_trait]
impl Tool for GetSpecialPricing {
    fn name(&self) -> &'static str {
        "get_special_pricing"
    }

    fn description(&self) -> &'static str {
        "Get all active special pricing"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _input: Value) -> Result<Value> {
        let specials = self.context.menu.running_specials(self.context.now()).await?;
        let categories = self.context.category_names().await?;

        let mut listed = Vec::with_capacity(specials.len());
        for special in specials {
            let Some(item) = self.context.menu.find_item(special.menu_item_id).await? else {
                continue;
            };
            listed.push(json!({
                "item_id": item.id.0,
                "item_name": item.name,
                "category": categories.get(&item.category_id),
                "regular_price": money(item.price),
                "special_price": money(special.special_price),
                "description": special.description,
                "start_date": special.start_at.format(TIMESTAMP_FORMAT).to_string(),
                "end_date": special.end_at.format(TIMESTAMP_FORMAT).to_string(),
                "savings": money(special.savings(item.price)),
                "savings_percentage": money(special.savings_percentage(item.price)),
            }));
        }
        Ok(Value::Array(listed))
    }
}

#[async_trait]
impl Tool for CalculateOrderTotal {
    fn name(&self) -> &'static str {
        "calculate_order_total"
    }

    fn description(&self) -> &'static str {
        "Calculate the total for an order"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "description": "List of items in the order",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "integer", "description": "The ID of the menu item"},
                            "quantity": {"type": "integer", "description": "The quantity of the item"}
                        },
                        "required": ["id", "quantity"]
                    }
                }
            },
            "required": ["items"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: OrderArgs = parse_args(self.name(), input)?;

        let mut lines = Vec::with_capacity(args.items.len());
        for entry in args.items {
            // Unknown ids are skipped rather than failing the whole order.
            let Some(item) = self.context.menu.find_item(MenuItemId(entry.id)).await? else {
                continue;
            };
            let unit_price = self.context.price_now(&item).await?;
            lines.push(OrderLine::new(&item, unit_price, entry.quantity));
        }

        let summary = OrderSummary::from_lines(lines);
        Ok(json!({
            "items": summary
                .items
                .iter()
                .map(|line| json!({
                    "id": line.id.0,
                    "name": line.name,
                    "price": money(line.price),
                    "quantity": line.quantity,
                    "total": money(line.total),
                }))
                .collect::<Vec<_>>(),
            "subtotal": money(summary.subtotal),
            "tax_rate": money(summary.tax_rate),
            "tax": money(summary.tax),
            "total": money(summary.total),
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::tools::test_support::registry;

    #[tokio::test]
    async fn item_price_reports_running_special_and_savings() {
        let registry = registry().await;

        let chicken = registry.dispatch("get_item_price", json!({"item_id": 4})).await;
        assert_eq!(chicken.result["regular_price"], json!(15.99));
        assert_eq!(chicken.result["current_price"], json!(13.99));
        assert_eq!(chicken.result["has_special_pricing"], json!(true));
        assert_eq!(chicken.result["special_pricing"]["description"], "Weekend Special");
        assert_eq!(chicken.result["savings"], json!(2.0));

        let samosa = registry.dispatch("get_item_price", json!({"item_id": 1})).await;
        assert_eq!(samosa.result["has_special_pricing"], json!(false));
        assert!(samosa.result.get("special_pricing").is_none());

        let missing = registry.dispatch("get_item_price", json!({"item_id": 999})).await;
        assert!(missing.result.is_null());
    }

    #[tokio::test]
    async fn specials_carry_savings_percentage() {
        let registry = registry().await;
        let outcome = registry.dispatch("get_special_pricing", json!({})).await;

        let specials = outcome.result.as_array().expect("array");
        assert_eq!(specials.len(), 3);
        let chicken =
            specials.iter().find(|special| special["item_name"] == "Butter Chicken").expect("chicken");
        assert_eq!(chicken["savings_percentage"], json!(12.51));
        assert_eq!(chicken["category"], "Main Courses");
    }

    #[tokio::test]
    async fn order_total_skips_unknown_items_and_applies_tax() {
        let registry = registry().await;
        let outcome = registry
            .dispatch(
                "calculate_order_total",
                json!({"items": [{"id": 1, "quantity": 2}, {"id": 999}]}),
            )
            .await;

        assert_eq!(outcome.result["items"].as_array().map(Vec::len), Some(1));
        assert_eq!(outcome.result["subtotal"], json!(11.98));
        assert_eq!(outcome.result["tax_rate"], json!(0.085));
        assert_eq!(outcome.result["tax"], json!(1.02));
        assert_eq!(outcome.result["total"], json!(13.0));
    }
}
