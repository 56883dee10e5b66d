use chrono::NaiveDateTime;
use sqlx::{sqlite::SqliteRow, Row};

use hostline_core::domain::menu::{
    CategoryId, DietaryRestriction, DietaryRestrictionType, Ingredient, MenuCategory, MenuItem,
    MenuItemId, SpecialPricing,
};

use super::codec::{format_local, parse_decimal, parse_local, parse_u32};
use super::{MenuRepository, RepositoryError};
use crate::DbPool;

const ITEM_COLUMNS: &str = "mi.id, mi.category_id, mi.name, mi.description, mi.price, \
     mi.is_available, mi.special_item, mi.spiciness_level, mi.preparation_time_minutes";

const SPECIAL_COLUMNS: &str =
    "id, menu_item_id, special_price, description, start_at, end_at, active";

pub struct SqlMenuRepository {
    pool: DbPool,
}

impl SqlMenuRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MenuRepository for SqlMenuRepository {
    async fn list_categories(&self) -> Result<Vec<MenuCategory>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, description, display_order
             FROM menu_category
             ORDER BY display_order ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(category_from_row).collect()
    }

    async fn list_items_by_category(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<MenuItem>, RepositoryError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS}
             FROM menu_item mi
             WHERE mi.category_id = ? AND mi.is_available = 1
             ORDER BY mi.id ASC"
        );
        let rows = sqlx::query(&sql).bind(category_id.0).fetch_all(&self.pool).await?;

        rows.into_iter().map(item_from_row).collect()
    }

    async fn search_items(&self, query: &str) -> Result<Vec<MenuItem>, RepositoryError> {
        let needle = query.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {ITEM_COLUMNS}
             FROM menu_item mi
             WHERE mi.is_available = 1 AND instr(LOWER(mi.name), LOWER(?)) > 0
             ORDER BY mi.name ASC"
        );
        let rows = sqlx::query(&sql).bind(needle).fetch_all(&self.pool).await?;

        rows.into_iter().map(item_from_row).collect()
    }

    async fn list_items_by_dietary_restriction(
        &self,
        restriction: DietaryRestrictionType,
    ) -> Result<Vec<MenuItem>, RepositoryError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS}
             FROM menu_item mi
             JOIN menu_item_dietary_restriction midr ON midr.menu_item_id = mi.id
             JOIN dietary_restriction dr ON dr.id = midr.dietary_restriction_id
             WHERE dr.restriction_type = ? AND mi.is_available = 1
             ORDER BY mi.id ASC"
        );
        let rows = sqlx::query(&sql).bind(restriction.as_str()).fetch_all(&self.pool).await?;

        rows.into_iter().map(item_from_row).collect()
    }

    async fn find_item(&self, id: MenuItemId) -> Result<Option<MenuItem>, RepositoryError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM menu_item mi WHERE mi.id = ?");
        let row = sqlx::query(&sql).bind(id.0).fetch_optional(&self.pool).await?;

        row.map(item_from_row).transpose()
    }

    async fn dietary_restrictions_for_item(
        &self,
        id: MenuItemId,
    ) -> Result<Vec<DietaryRestriction>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT dr.id, dr.restriction_type, dr.description
             FROM dietary_restriction dr
             JOIN menu_item_dietary_restriction midr ON midr.dietary_restriction_id = dr.id
             WHERE midr.menu_item_id = ?
             ORDER BY dr.id ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(restriction_from_row).collect()
    }

    async fn ingredients_for_item(
        &self,
        id: MenuItemId,
    ) -> Result<Vec<Ingredient>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT i.id, i.name, i.description, i.allergen
             FROM ingredient i
             JOIN menu_item_ingredient mii ON mii.ingredient_id = i.id
             WHERE mii.menu_item_id = ?
             ORDER BY i.id ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Ingredient {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    description: row.try_get("description")?,
                    allergen: row.try_get("allergen")?,
                })
            })
            .collect()
    }

    async fn specials_for_item(
        &self,
        id: MenuItemId,
    ) -> Result<Vec<SpecialPricing>, RepositoryError> {
        let sql = format!(
            "SELECT {SPECIAL_COLUMNS}
             FROM special_pricing
             WHERE menu_item_id = ? AND active = 1
             ORDER BY start_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql).bind(id.0).fetch_all(&self.pool).await?;

        rows.into_iter().map(special_from_row).collect()
    }

    async fn running_specials(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<SpecialPricing>, RepositoryError> {
        let now = format_local(now);
        let sql = format!(
            "SELECT {SPECIAL_COLUMNS}
             FROM special_pricing
             WHERE active = 1 AND start_at <= ? AND end_at >= ?
             ORDER BY menu_item_id ASC, id ASC"
        );
        let rows = sqlx::query(&sql).bind(&now).bind(&now).fetch_all(&self.pool).await?;

        rows.into_iter().map(special_from_row).collect()
    }
}

fn category_from_row(row: SqliteRow) -> Result<MenuCategory, RepositoryError> {
    Ok(MenuCategory {
        id: CategoryId(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        display_order: row.try_get("display_order")?,
    })
}

fn item_from_row(row: SqliteRow) -> Result<MenuItem, RepositoryError> {
    let price_raw = row.try_get::<String, _>("price")?;
    let spiciness = row.try_get::<i64, _>("spiciness_level")?;

    Ok(MenuItem {
        id: MenuItemId(row.try_get("id")?),
        category_id: CategoryId(row.try_get("category_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: parse_decimal("price", &price_raw)?,
        is_available: row.try_get("is_available")?,
        special_item: row.try_get("special_item")?,
        spiciness_level: u8::try_from(spiciness).map_err(|_| {
            RepositoryError::Decode(format!("invalid spiciness_level `{spiciness}`"))
        })?,
        preparation_time_minutes: parse_u32(
            "preparation_time_minutes",
            row.try_get("preparation_time_minutes")?,
        )?,
    })
}

fn restriction_from_row(row: SqliteRow) -> Result<DietaryRestriction, RepositoryError> {
    let raw = row.try_get::<String, _>("restriction_type")?;
    let restriction_type = raw
        .parse::<DietaryRestrictionType>()
        .map_err(|_| RepositoryError::Decode(format!("unknown restriction_type `{raw}`")))?;

    Ok(DietaryRestriction {
        id: row.try_get("id")?,
        restriction_type,
        description: row.try_get("description")?,
    })
}

fn special_from_row(row: SqliteRow) -> Result<SpecialPricing, RepositoryError> {
    let price_raw = row.try_get::<String, _>("special_price")?;
    let start_raw = row.try_get::<String, _>("start_at")?;
    let end_raw = row.try_get::<String, _>("end_at")?;

    Ok(SpecialPricing {
        id: row.try_get("id")?,
        menu_item_id: MenuItemId(row.try_get("menu_item_id")?),
        special_price: parse_decimal("special_price", &price_raw)?,
        description: row.try_get("description")?,
        start_at: parse_local("start_at", &start_raw)?,
        end_at: parse_local("end_at", &end_raw)?,
        active: row.try_get("active")?,
    })
}
