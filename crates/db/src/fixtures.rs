use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use sqlx::{Executor, Row};

use hostline_core::domain::reservation::{BookingPolicy, RestaurantTable, TableId};

use crate::connection::DbPool;
use crate::repositories::codec::{format_local, parse_u32};
use crate::repositories::RepositoryError;

/// Time-relative specials; `starts_days`/`ends_days` are offsets from the seed instant.
const SEED_SPECIALS: &[SeedSpecial] = &[
    SeedSpecial {
        item_name: "Butter Chicken",
        special_price: "13.99",
        description: "Weekend Special",
        starts_days: -1,
        ends_days: 2,
    },
    SeedSpecial {
        item_name: "Paneer Tikka",
        special_price: "6.99",
        description: "Starter Special",
        starts_days: -3,
        ends_days: 4,
    },
    SeedSpecial {
        item_name: "Gulab Jamun",
        special_price: "4.99",
        description: "Dessert of the Week",
        starts_days: -2,
        ends_days: 5,
    },
];

/// Confirmed 18:00 bookings on each of the next five days.
const SEED_RESERVATIONS: &[SeedReservation] = &[
    SeedReservation { customer_name: "Raj Patel", party_size: 2, days_ahead: 1 },
    SeedReservation { customer_name: "Priya Sharma", party_size: 4, days_ahead: 2 },
    SeedReservation { customer_name: "Vikram Singh", party_size: 6, days_ahead: 3 },
    SeedReservation { customer_name: "Ananya Desai", party_size: 3, days_ahead: 4 },
    SeedReservation { customer_name: "Arjun Mehta", party_size: 5, days_ahead: 5 },
];

const CATALOG_COUNTS: &[(&str, &str, i64)] = &[
    ("menu-categories", "menu_category", 6),
    ("ingredients", "ingredient", 23),
    ("dietary-restrictions", "dietary_restriction", 6),
    ("menu-items", "menu_item", 17),
    ("restaurant-tables", "restaurant_table", 6),
];

/// Demo dataset for the Taste of India restaurant.
///
/// The static catalog lives in an idempotent SQL fixture. Specials and reservations are
/// generated relative to the seed time so they stay current whenever the seed runs.
pub struct RestaurantSeedDataset;

impl RestaurantSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/restaurant_seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        Self::load_at(pool, Local::now().naive_local()).await
    }

    pub async fn load_at(pool: &DbPool, now: NaiveDateTime) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;

        let mut specials_inserted = 0;
        for special in SEED_SPECIALS {
            let inserted = sqlx::query(
                "INSERT INTO special_pricing
                    (menu_item_id, special_price, description, start_at, end_at, active)
                 SELECT mi.id, ?1, ?2, ?3, ?4, 1
                 FROM menu_item mi
                 WHERE mi.name = ?5
                   AND NOT EXISTS (
                       SELECT 1 FROM special_pricing sp
                       WHERE sp.menu_item_id = mi.id AND sp.description = ?2
                   )",
            )
            .bind(special.special_price)
            .bind(special.description)
            .bind(format_local(now + Duration::days(special.starts_days)))
            .bind(format_local(now + Duration::days(special.ends_days)))
            .bind(special.item_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            specials_inserted += inserted as usize;
        }

        let table_rows = sqlx::query(
            "SELECT id, table_number, capacity, location, is_active
             FROM restaurant_table
             ORDER BY table_number ASC",
        )
        .fetch_all(&mut *tx)
        .await?;
        let tables = table_rows
            .into_iter()
            .map(|row| {
                Ok(RestaurantTable {
                    id: TableId(row.try_get("id")?),
                    table_number: row.try_get("table_number")?,
                    capacity: parse_u32("capacity", row.try_get("capacity")?)?,
                    location: row.try_get("location")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        let policy = BookingPolicy::default();
        let dinner = NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN);
        let mut reservations_inserted = 0;
        for (index, seed) in SEED_RESERVATIONS.iter().enumerate() {
            let phone = seed.phone(index);
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM reservation WHERE customer_name = ?1 AND customer_phone = ?2)",
            )
            .bind(seed.customer_name)
            .bind(&phone)
            .fetch_one(&mut *tx)
            .await?;
            if exists == 1 {
                continue;
            }

            let reservation_at = (now.date() + Duration::days(seed.days_ahead)).and_time(dinner);
            let special_requests = (index % 2 == 0).then_some("Window seat if possible");
            let reservation_id = sqlx::query(
                "INSERT INTO reservation (
                    customer_name, customer_phone, customer_email, party_size, reservation_at,
                    special_requests, status, created_at, updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, 'confirmed', ?, ?)",
            )
            .bind(seed.customer_name)
            .bind(&phone)
            .bind(seed.email())
            .bind(i64::from(seed.party_size))
            .bind(format_local(reservation_at))
            .bind(special_requests)
            .bind(format_local(now))
            .bind(format_local(now))
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            for table in policy.assign_tables(&tables, seed.party_size) {
                sqlx::query("INSERT INTO reservation_table (reservation_id, table_id) VALUES (?, ?)")
                    .bind(reservation_id)
                    .bind(table.id.0)
                    .execute(&mut *tx)
                    .await?;
            }
            reservations_inserted += 1;
        }

        tx.commit().await?;

        Ok(SeedResult {
            menu_items: 17,
            tables: tables.len(),
            specials_inserted,
            reservations_inserted,
        })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (label, table, expected) in CATALOG_COUNTS {
            let count: i64 =
                sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}")).fetch_one(pool).await?;
            checks.push((*label, count == *expected));
        }

        for special in SEED_SPECIALS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM special_pricing sp
                    JOIN menu_item mi ON mi.id = sp.menu_item_id
                    WHERE mi.name = ?1 AND sp.description = ?2 AND sp.special_price = ?3
                 )",
            )
            .bind(special.item_name)
            .bind(special.description)
            .bind(special.special_price)
            .fetch_one(pool)
            .await?;
            checks.push((special.description, present == 1));
        }

        for (index, seed) in SEED_RESERVATIONS.iter().enumerate() {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM reservation r
                    WHERE r.customer_name = ?1 AND r.customer_phone = ?2 AND r.party_size = ?3
                      AND EXISTS (SELECT 1 FROM reservation_table rt WHERE rt.reservation_id = r.id)
                 )",
            )
            .bind(seed.customer_name)
            .bind(seed.phone(index))
            .bind(i64::from(seed.party_size))
            .fetch_one(pool)
            .await?;
            checks.push((seed.customer_name, present == 1));
        }

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedSpecial {
    item_name: &'static str,
    special_price: &'static str,
    description: &'static str,
    starts_days: i64,
    ends_days: i64,
}

#[derive(Debug, Clone, Copy)]
struct SeedReservation {
    customer_name: &'static str,
    party_size: u32,
    days_ahead: i64,
}

impl SeedReservation {
    fn phone(&self, index: usize) -> String {
        format!("555-010-{:04}", index + 1)
    }

    fn email(&self) -> String {
        format!("{}@example.com", self.customer_name.to_lowercase().replace(' ', "."))
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub menu_items: usize,
    pub tables: usize,
    pub specials_inserted: usize,
    pub reservations_inserted: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
