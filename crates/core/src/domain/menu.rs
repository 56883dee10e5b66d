use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MenuItemId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuCategory {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub display_order: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub is_available: bool,
    pub special_item: bool,
    pub spiciness_level: u8,
    pub preparation_time_minutes: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub allergen: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietaryRestrictionType {
    Vegetarian,
    Vegan,
    GlutenFree,
    DairyFree,
    NutFree,
    Halal,
    Kosher,
}

impl DietaryRestrictionType {
    pub const ALL: [Self; 7] = [
        Self::Vegetarian,
        Self::Vegan,
        Self::GlutenFree,
        Self::DairyFree,
        Self::NutFree,
        Self::Halal,
        Self::Kosher,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vegetarian => "vegetarian",
            Self::Vegan => "vegan",
            Self::GlutenFree => "gluten_free",
            Self::DairyFree => "dairy_free",
            Self::NutFree => "nut_free",
            Self::Halal => "halal",
            Self::Kosher => "kosher",
        }
    }

    pub fn allowed_values() -> String {
        Self::ALL.iter().map(|value| value.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl std::str::FromStr for DietaryRestrictionType {
    type Err = DomainError;

    /// Accepts spoken variants such as `gluten-free` or `Dairy Free`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == normalized).ok_or_else(|| {
            DomainError::InvalidDietaryRestriction {
                value: value.to_string(),
                allowed: Self::allowed_values(),
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DietaryRestriction {
    pub id: i64,
    pub restriction_type: DietaryRestrictionType,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecialPricing {
    pub id: i64,
    pub menu_item_id: MenuItemId,
    pub special_price: Decimal,
    pub description: Option<String>,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub active: bool,
}

impl SpecialPricing {
    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        self.active && self.start_at <= now && now <= self.end_at
    }

    pub fn savings(&self, regular_price: Decimal) -> Decimal {
        round_money(regular_price - self.special_price)
    }

    pub fn savings_percentage(&self, regular_price: Decimal) -> Decimal {
        if regular_price.is_zero() {
            return Decimal::ZERO;
        }
        round_money((regular_price - self.special_price) / regular_price * Decimal::ONE_HUNDRED)
    }
}

/// Price a caller pays right now: the first special running at `now`, else the list price.
pub fn current_price(item: &MenuItem, specials: &[SpecialPricing], now: NaiveDateTime) -> Decimal {
    active_special(item.id, specials, now).map_or(item.price, |special| special.special_price)
}

pub fn active_special(
    item_id: MenuItemId,
    specials: &[SpecialPricing],
    now: NaiveDateTime,
) -> Option<&SpecialPricing> {
    specials.iter().find(|special| special.menu_item_id == item_id && special.is_active_at(now))
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sales tax applied by `calculate_order_total` (8.5%).
pub fn sales_tax_rate() -> Decimal {
    Decimal::new(85, 3)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: MenuItemId,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub items: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl OrderSummary {
    pub fn from_lines(items: Vec<OrderLine>) -> Self {
        let subtotal = round_money(items.iter().map(|line| line.total).sum());
        let tax_rate = sales_tax_rate();
        let tax = round_money(subtotal * tax_rate);
        Self { items, subtotal, tax_rate, tax, total: round_money(subtotal + tax) }
    }
}

impl OrderLine {
    pub fn new(item: &MenuItem, unit_price: Decimal, quantity: u32) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            price: unit_price,
            quantity,
            total: round_money(unit_price * Decimal::from(quantity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use rust_decimal::Decimal;

    use super::{
        current_price, CategoryId, DietaryRestrictionType, MenuItem, MenuItemId, OrderLine,
        OrderSummary, SpecialPricing,
    };
    use crate::errors::DomainError;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("valid timestamp")
    }

    fn butter_chicken() -> MenuItem {
        MenuItem {
            id: MenuItemId(4),
            category_id: CategoryId(2),
            name: "Butter Chicken".to_string(),
            description: None,
            price: Decimal::new(1599, 2),
            is_available: true,
            special_item: true,
            spiciness_level: 2,
            preparation_time_minutes: 20,
        }
    }

    fn weekend_special(start: NaiveDateTime, end: NaiveDateTime, active: bool) -> SpecialPricing {
        SpecialPricing {
            id: 1,
            menu_item_id: MenuItemId(4),
            special_price: Decimal::new(1399, 2),
            description: Some("Weekend Special".to_string()),
            start_at: start,
            end_at: end,
            active,
        }
    }

    #[test]
    fn running_special_overrides_list_price() {
        let now = noon();
        let specials =
            vec![weekend_special(now - Duration::days(1), now + Duration::days(2), true)];

        assert_eq!(current_price(&butter_chicken(), &specials, now), Decimal::new(1399, 2));
        assert_eq!(specials[0].savings(Decimal::new(1599, 2)), Decimal::new(200, 2));
        assert_eq!(specials[0].savings_percentage(Decimal::new(1599, 2)), Decimal::new(1251, 2));
    }

    #[test]
    fn expired_or_disabled_specials_are_ignored() {
        let now = noon();
        let specials = vec![
            weekend_special(now - Duration::days(5), now - Duration::days(1), true),
            weekend_special(now - Duration::days(1), now + Duration::days(1), false),
        ];

        assert_eq!(current_price(&butter_chicken(), &specials, now), Decimal::new(1599, 2));
    }

    #[test]
    fn dietary_types_accept_spoken_spellings() {
        assert_eq!(
            "Gluten-Free".parse::<DietaryRestrictionType>().ok(),
            Some(DietaryRestrictionType::GlutenFree)
        );
        assert_eq!(
            "dairy free".parse::<DietaryRestrictionType>().ok(),
            Some(DietaryRestrictionType::DairyFree)
        );

        let error = "paleo".parse::<DietaryRestrictionType>().expect_err("unknown type");
        assert!(matches!(error, DomainError::InvalidDietaryRestriction { .. }));
        assert!(error.to_string().starts_with("Invalid restriction type. Allowed values: vegetarian"));
    }

    #[test]
    fn order_summary_applies_tax_on_rounded_subtotal() {
        let samosa = MenuItem {
            id: MenuItemId(1),
            category_id: CategoryId(1),
            name: "Samosa".to_string(),
            description: None,
            price: Decimal::new(599, 2),
            is_available: true,
            special_item: false,
            spiciness_level: 1,
            preparation_time_minutes: 10,
        };

        let summary = OrderSummary::from_lines(vec![OrderLine::new(&samosa, samosa.price, 2)]);

        assert_eq!(summary.subtotal, Decimal::new(1198, 2));
        assert_eq!(summary.tax, Decimal::new(102, 2));
        assert_eq!(summary.total, Decimal::new(1300, 2));
    }
}
