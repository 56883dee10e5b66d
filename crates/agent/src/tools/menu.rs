use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use hostline_core::domain::menu::{
    active_special, current_price, CategoryId, DietaryRestriction, DietaryRestrictionType,
    MenuItem, MenuItemId,
};

use super::{money, parse_args, Tool, ToolContext};

pub struct GetMenuCategories {
    context: Arc<ToolContext>,
}

pub struct GetMenuItemsByCategory {
    context: Arc<ToolContext>,
}

pub struct SearchMenuItems {
    context: Arc<ToolContext>,
}

pub struct GetMenuItemsByDietaryRestriction {
    context: Arc<ToolContext>,
}

pub struct GetMenuItemDetails {
    context: Arc<ToolContext>,
}

macro_rules! context_constructor {
    ($($tool:ident),+ $(,)?) => {
        $(impl $tool {
            pub fn new(context: Arc<ToolContext>) -> Self {
                Self { context }
            }
        })+
    };
}

pub(crate) use context_constructor;

context_constructor!(
    GetMenuCategories,
    GetMenuItemsByCategory,
    SearchMenuItems,
    GetMenuItemsByDietaryRestriction,
    GetMenuItemDetails,
);

#[derive(Deserialize)]
struct CategoryArgs {
    category_id: i64,
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Deserialize)]
struct DietaryArgs {
    restriction_type: String,
}

#[derive(Deserialize)]
struct ItemArgs {
    item_id: i64,
}

impl ToolContext {
    pub(crate) async fn price_now(&self, item: &MenuItem) -> Result<rust_decimal::Decimal> {
        let specials = self.menu.specials_for_item(item.id).await?;
        Ok(current_price(item, &specials, self.now()))
    }

    pub(crate) async fn category_names(&self) -> Result<HashMap<CategoryId, String>> {
        let categories = self.menu.list_categories().await?;
        Ok(categories.into_iter().map(|category| (category.id, category.name)).collect())
    }

    /// Compact listing shape shared by search and dietary lookups.
    async fn item_summaries(&self, items: Vec<MenuItem>) -> Result<Value> {
        let categories = self.category_names().await?;
        let mut summaries = Vec::with_capacity(items.len());
        for item in items.iter().filter(|item| item.is_available) {
            summaries.push(json!({
                "id": item.id.0,
                "name": item.name,
                "description": item.description,
                "price": money(self.price_now(item).await?),
                "category": categories.get(&item.category_id),
                "is_available": item.is_available,
            }));
        }
        Ok(Value::Array(summaries))
    }
}

fn restriction_json(restrictions: &[DietaryRestriction]) -> Value {
    restrictions
        .iter()
        .map(|restriction| {
            json!({
                "id": restriction.id,
                "type": restriction.restriction_type.as_str(),
                "description": restriction.description,
            })
        })
        .collect()
}

#[async_trait]
impl Tool for GetMenuCategories {
    fn name(&self) -> &'static str {
        "get_menu_categories"
    }

    fn description(&self) -> &'static str {
        "Get a list of all menu categories"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _input: Value) -> Result<Value> {
        let categories = self.context.menu.list_categories().await?;
        Ok(categories
            .into_iter()
            .map(|category| {
                json!({
                    "id": category.id.0,
                    "name": category.name,
                    "description": category.description,
                    "display_order": category.display_order,
                })
            })
            .collect())
    }
}

#[async_trait]
impl Tool for GetMenuItemsByCategory {
    fn name(&self) -> &'static str {
        "get_menu_items_by_category"
    }

    fn description(&self) -> &'static str {
        "Get menu items in a specific category"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category_id": {"type": "integer", "description": "The ID of the category"}
            },
            "required": ["category_id"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: CategoryArgs = parse_args(self.name(), input)?;
        let items = self.context.menu.list_items_by_category(CategoryId(args.category_id)).await?;

        let mut listed = Vec::with_capacity(items.len());
        for item in items.iter().filter(|item| item.is_available) {
            let restrictions = self.context.menu.dietary_restrictions_for_item(item.id).await?;
            listed.push(json!({
                "id": item.id.0,
                "name": item.name,
                "description": item.description,
                "price": money(self.context.price_now(item).await?),
                "is_available": item.is_available,
                "special_item": item.special_item,
                "spiciness_level": item.spiciness_level,
                "preparation_time_minutes": item.preparation_time_minutes,
                "dietary_restrictions": restriction_json(&restrictions),
            }));
        }
        Ok(Value::Array(listed))
    }
}

#[async_trait]
impl Tool for SearchMenuItems {
    fn name(&self) -> &'static str {
        "search_menu_items"
    }

    fn description(&self) -> &'static str {
        "Search for menu items by name"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: SearchArgs = parse_args(self.name(), input)?;
        let items = self.context.menu.search_items(args.query.trim()).await?;
        self.context.item_summaries(items).await
    }
}

#[async_trait]
impl Tool for GetMenuItemsByDietaryRestriction {
    fn name(&self) -> &'static str {
        "get_menu_items_by_dietary_restriction"
    }

    fn description(&self) -> &'static str {
        "Get menu items with a specific dietary restriction"
    }

    fn parameters(&self) -> Value {
        let allowed: Vec<&str> =
            DietaryRestrictionType::ALL.iter().map(|restriction| restriction.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "restriction_type": {
                    "type": "string",
                    "description": "The dietary restriction type",
                    "enum": allowed
                }
            },
            "required": ["restriction_type"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: DietaryArgs = parse_args(self.name(), input)?;
        let restriction: DietaryRestrictionType = args.restriction_type.parse()?;
        let items = self.context.menu.list_items_by_dietary_restriction(restriction).await?;
        self.context.item_summaries(items).await
    }
}

#[async_trait]
impl Tool for GetMenuItemDetails {
    fn name(&self) -> &'static str {
        "get_menu_item_details"
    }

    fn description(&self) -> &'static str {
        "Get full details for a menu item, including ingredients and specials"
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
        let menu = &self.context.menu;
        let Some(item) = menu.find_item(MenuItemId(args.item_id)).await? else {
            return Ok(Value::Null);
        };

        let now = self.context.now();
        let specials = menu.specials_for_item(item.id).await?;
        let restrictions = menu.dietary_restrictions_for_item(item.id).await?;
        let ingredients = menu.ingredients_for_item(item.id).await?;
        let categories = self.context.category_names().await?;

        Ok(json!({
            "id": item.id.0,
            "name": item.name,
            "description": item.description,
            "price": money(current_price(&item, &specials, now)),
            "regular_price": money(item.price),
            "category": categories.get(&item.category_id),
            "is_available": item.is_available,
            "special_item": item.special_item,
            "spiciness_level": item.spiciness_level,
            "preparation_time_minutes": item.preparation_time_minutes,
            "dietary_restrictions": restriction_json(&restrictions),
            "ingredients": ingredients
                .iter()
                .map(|ingredient| json!({
                    "id": ingredient.id,
                    "name": ingredient.name,
                    "description": ingredient.description,
                    "allergen": ingredient.allergen,
                }))
                .collect::<Vec<_>>(),
            "special_pricing": specials
                .iter()
                .map(|special| json!({
                    "id": special.id,
                    "special_price": money(special.special_price),
                    "description": special.description,
                    "start_date": special.start_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    "end_date": special.end_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    "active": active_special(item.id, std::slice::from_ref(special), now).is_some(),
                }))
                .collect::<Vec<_>>(),
        }))
    }
}
