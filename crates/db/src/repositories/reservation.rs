use chrono::NaiveDateTime;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use hostline_core::domain::reservation::{
    BookingPolicy, NewReservation, Reservation, ReservationId, ReservationStatus,
    RestaurantTable, TableId,
};

use super::codec::{format_local, parse_local, parse_u32};
use super::{BookingOutcome, RepositoryError, ReservationRepository};
use crate::DbPool;

const RESERVATION_COLUMNS: &str = "id, customer_name, customer_phone, customer_email, party_size, \
     reservation_at, special_requests, status, created_at, updated_at";

const HOLDING_STATUSES: &str = "('pending', 'confirmed')";

pub struct SqlReservationRepository {
    pool: DbPool,
}

impl SqlReservationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn tables_for(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Vec<RestaurantTable>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT t.id, t.table_number, t.capacity, t.location, t.is_active
             FROM restaurant_table t
             JOIN reservation_table rt ON rt.table_id = t.id
             WHERE rt.reservation_id = ?
             ORDER BY t.table_number ASC",
        )
        .bind(reservation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(table_from_row).collect()
    }

    async fn with_tables(&self, row: SqliteRow) -> Result<Reservation, RepositoryError> {
        let mut reservation = reservation_from_row(row)?;
        reservation.tables = self.tables_for(reservation.id).await?;
        Ok(reservation)
    }
}

#[async_trait::async_trait]
impl ReservationRepository for SqlReservationRepository {
    async fn count_holding_slot(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<usize, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        count_in_window(&mut conn, start, end).await
    }

    async fn available_tables(
        &self,
        party_size: u32,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RestaurantTable>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        free_tables(&mut conn, party_size, start, end).await
    }

    async fn book(
        &self,
        request: &NewReservation,
        policy: &BookingPolicy,
        now: NaiveDateTime,
    ) -> Result<BookingOutcome, RepositoryError> {
        // IMMEDIATE takes the write lock up front so the capacity check and the insert
        // see the same snapshot. Dropping the transaction on error rolls it back.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let outcome = book_locked(&mut *tx, request, policy, now).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, RepositoryError> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservation WHERE id = ?");
        let row = sqlx::query(&sql).bind(id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(Some(self.with_tables(row).await?)),
            None => Ok(None),
        }
    }

    async fn upcoming_for_phone(
        &self,
        customer_phone: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<Reservation>, RepositoryError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS}
             FROM reservation
             WHERE customer_phone = ? AND reservation_at >= ? AND status = 'confirmed'
             ORDER BY reservation_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(customer_phone)
            .bind(format_local(now))
            .fetch_all(&self.pool)
            .await?;

        let mut reservations = Vec::with_capacity(rows.len());
        for row in rows {
            reservations.push(self.with_tables(row).await?);
        }
        Ok(reservations)
    }

    async fn update_status(
        &self,
        id: ReservationId,
        status: ReservationStatus,
        updated_at: NaiveDateTime,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE reservation SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_local(updated_at))
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<RestaurantTable>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, table_number, capacity, location, is_active
             FROM restaurant_table
             ORDER BY table_number ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(table_from_row).collect()
    }
}

async fn book_locked(
    conn: &mut SqliteConnection,
    request: &NewReservation,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> Result<BookingOutcome, RepositoryError> {
    let (start, end) = policy.window_around(request.reservation_at);

    let holding = count_in_window(conn, start, end).await?;
    if !policy.has_capacity(holding) {
        return Ok(BookingOutcome::SlotFull);
    }

    let free = free_tables(conn, request.party_size, start, end).await?;
    let assigned = policy.assign_tables(&free, request.party_size);

    let id = sqlx::query(
        "INSERT INTO reservation (
            customer_name, customer_phone, customer_email, party_size, reservation_at,
            special_requests, status, created_at, updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&request.customer_name)
    .bind(&request.customer_phone)
    .bind(&request.customer_email)
    .bind(i64::from(request.party_size))
    .bind(format_local(request.reservation_at))
    .bind(&request.special_requests)
    .bind(ReservationStatus::Confirmed.as_str())
    .bind(format_local(now))
    .bind(format_local(now))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    for table in &assigned {
        sqlx::query("INSERT INTO reservation_table (reservation_id, table_id) VALUES (?, ?)")
            .bind(id)
            .bind(table.id.0)
            .execute(&mut *conn)
            .await?;
    }

    Ok(BookingOutcome::Booked(Reservation {
        id: ReservationId(id),
        customer_name: request.customer_name.clone(),
        customer_phone: request.customer_phone.clone(),
        customer_email: request.customer_email.clone(),
        party_size: request.party_size,
        reservation_at: request.reservation_at,
        special_requests: request.special_requests.clone(),
        status: ReservationStatus::Confirmed,
        created_at: now,
        updated_at: now,
        tables: assigned,
    }))
}

async fn count_in_window(
    conn: &mut SqliteConnection,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<usize, RepositoryError> {
    let sql = format!(
        "SELECT COUNT(1) FROM reservation
         WHERE status IN {HOLDING_STATUSES} AND reservation_at BETWEEN ? AND ?"
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(format_local(start))
        .bind(format_local(end))
        .fetch_one(&mut *conn)
        .await?;

    usize::try_from(count)
        .map_err(|_| RepositoryError::Decode(format!("invalid reservation count `{count}`")))
}

async fn free_tables(
    conn: &mut SqliteConnection,
    party_size: u32,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<RestaurantTable>, RepositoryError> {
    let sql = format!(
        "SELECT t.id, t.table_number, t.capacity, t.location, t.is_active
         FROM restaurant_table t
         WHERE t.is_active = 1
           AND t.capacity >= ?
           AND t.id NOT IN (
               SELECT rt.table_id
               FROM reservation_table rt
               JOIN reservation r ON r.id = rt.reservation_id
               WHERE r.status IN {HOLDING_STATUSES} AND r.reservation_at BETWEEN ? AND ?
           )
         ORDER BY t.capacity ASC, t.table_number ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(i64::from(party_size))
        .bind(format_local(start))
        .bind(format_local(end))
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter().map(table_from_row).collect()
}

fn table_from_row(row: SqliteRow) -> Result<RestaurantTable, RepositoryError> {
    Ok(RestaurantTable {
        id: TableId(row.try_get("id")?),
        table_number: row.try_get("table_number")?,
        capacity: parse_u32("capacity", row.try_get("capacity")?)?,
        location: row.try_get("location")?,
        is_active: row.try_get("is_active")?,
    })
}

fn reservation_from_row(row: SqliteRow) -> Result<Reservation, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = ReservationStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown reservation status `{status_raw}`")))?;
    let reservation_at = row.try_get::<String, _>("reservation_at")?;
    let created_at = row.try_get::<String, _>("created_at")?;
    let updated_at = row.try_get::<String, _>("updated_at")?;

    Ok(Reservation {
        id: ReservationId(row.try_get("id")?),
        customer_name: row.try_get("customer_name")?,
        customer_phone: row.try_get("customer_phone")?,
        customer_email: row.try_get("customer_email")?,
        party_size: parse_u32("party_size", row.try_get("party_size")?)?,
        reservation_at: parse_local("reservation_at", &reservation_at)?,
        special_requests: row.try_get("special_requests")?,
        status,
        created_at: parse_local("created_at", &created_at)?,
        updated_at: parse_local("updated_at", &updated_at)?,
        tables: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    use hostline_core::domain::reservation::{
        BookingPolicy, NewReservation, ReservationId, ReservationStatus,
    };

    use super::SqlReservationRepository;
    use crate::fixtures::RestaurantSeedDataset;
    use crate::repositories::{BookingOutcome, ReservationRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    fn seed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 1)
            .and_then(|date| date.and_hms_opt(9, 0, 0))
            .expect("valid timestamp")
    }

    fn request(name: &str, party_size: u32, at: NaiveDateTime) -> NewReservation {
        NewReservation {
            customer_name: name.to_string(),
            customer_phone: "+15550142".to_string(),
            customer_email: None,
            party_size,
            reservation_at: at,
            special_requests: None,
        }
    }

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        RestaurantSeedDataset::load_at(&pool, seed_time()).await.expect("seed");
        pool
    }

    async fn insert_confirmed(pool: &DbPool, at: NaiveDateTime, count: usize) {
        for index in 0..count {
            sqlx::query(
                "INSERT INTO reservation (
                    customer_name, customer_phone, party_size, reservation_at, status, created_at, updated_at
                 ) VALUES (?, '555', 2, ?, 'confirmed', '2026-05-01 09:00:00', '2026-05-01 09:00:00')",
            )
            .bind(format!("Guest {index}"))
            .bind(at.format("%Y-%m-%d %H:%M:%S").to_string())
            .execute(pool)
            .await
            .expect("insert reservation");
        }
    }

    #[tokio::test]
    async fn booking_assigns_smallest_fitting_table() {
        let repo = SqlReservationRepository::new(seeded_pool().await);
        let at = seed_time() + Duration::days(10) + Duration::hours(10);

        let outcome = repo
            .book(&request("Meera", 3, at), &BookingPolicy::default(), seed_time())
            .await
            .expect("book");

        let BookingOutcome::Booked(reservation) = outcome else {
            panic!("expected booking, got {outcome:?}");
        };
        assert_eq!(reservation.status, ReservationStatus::Confirmed);
        assert_eq!(reservation.tables.len(), 1);
        assert_eq!(reservation.tables[0].capacity, 4);
        assert_eq!(reservation.tables[0].table_number, 2);

        let stored = repo.find_by_id(reservation.id).await.expect("lookup").expect("stored");
        assert_eq!(stored.tables, reservation.tables);
        assert_eq!(stored.reservation_at, at);
    }

    #[tokio::test]
    async fn tenth_booking_in_window_fills_the_slot() {
        let pool = seeded_pool().await;
        let at = seed_time() + Duration::days(10) + Duration::hours(10);
        insert_confirmed(&pool, at + Duration::minutes(30), 10).await;
        let repo = SqlReservationRepository::new(pool);

        let (start, end) = BookingPolicy::default().window_around(at);
        assert_eq!(repo.count_holding_slot(start, end).await.expect("count"), 10);

        let outcome = repo
            .book(&request("Late", 2, at), &BookingPolicy::default(), seed_time())
            .await
            .expect("book");
        assert_eq!(outcome, BookingOutcome::SlotFull);

        let (start, end) = BookingPolicy::default().window_around(at + Duration::hours(1));
        assert_eq!(repo.count_holding_slot(start, end).await.expect("count"), 10);
        let (start, end) = BookingPolicy::default().window_around(at + Duration::hours(2));
        assert_eq!(repo.count_holding_slot(start, end).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn occupied_tables_are_not_reassigned_in_window() {
        let repo = SqlReservationRepository::new(seeded_pool().await);
        let at = seed_time() + Duration::days(10) + Duration::hours(10);
        let policy = BookingPolicy::default();

        let first = repo.book(&request("A", 8, at), &policy, seed_time()).await.expect("book");
        assert!(matches!(first, BookingOutcome::Booked(_)));

        let second = repo.book(&request("B", 8, at), &policy, seed_time()).await.expect("book");
        let BookingOutcome::Booked(second) = second else {
            panic!("slot has room, got {second:?}");
        };
        assert!(second.tables.is_empty());
        let stored = repo.find_by_id(second.id).await.expect("lookup").expect("stored");
        assert!(stored.tables.is_empty());

        let (start, end) = policy.window_around(at + Duration::hours(3));
        let free = repo.available_tables(8, start, end).await.expect("tables");
        assert_eq!(free.len(), 1);
    }

    #[tokio::test]
    async fn upcoming_lists_only_future_confirmed_for_phone() {
        let repo = SqlReservationRepository::new(seeded_pool().await);
        let policy = BookingPolicy::default();
        let soon = seed_time() + Duration::days(1) + Duration::hours(4);
        let later = seed_time() + Duration::days(2) + Duration::hours(4);

        let BookingOutcome::Booked(first) =
            repo.book(&request("Meera", 2, soon), &policy, seed_time()).await.expect("book")
        else {
            panic!("first booking should succeed");
        };
        repo.book(&request("Meera", 2, later), &policy, seed_time()).await.expect("book");
        repo.update_status(first.id, ReservationStatus::Canceled, seed_time())
            .await
            .expect("cancel");

        let upcoming = repo.upcoming_for_phone("+15550142", seed_time()).await.expect("upcoming");
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].reservation_at, later);

        let canceled = repo.find_by_id(first.id).await.expect("lookup").expect("stored");
        assert_eq!(canceled.status, ReservationStatus::Canceled);
        assert!(repo.find_by_id(ReservationId(9_999)).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn tables_are_listed_by_number() {
        let repo = SqlReservationRepository::new(seeded_pool().await);
        let numbers: Vec<i64> =
            repo.list_tables().await.expect("tables").into_iter().map(|t| t.table_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    }
}
