//! Reservation model: the domain record upserted from spreadsheet rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use sqlx::{FromRow, PgPool};

/// Reservation status, mapped to the `reservation_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Canceled,
    Completed,
}

impl std::str::FromStr for ReservationStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReservationStatus::Pending),
            "CANCELED" => Ok(ReservationStatus::Canceled),
            "COMPLETED" => Ok(ReservationStatus::Completed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub reservation_id: String,
    pub guest_name: String,
    pub status: ReservationStatus,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated reservation fields ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub reservation_id: String,
    pub guest_name: String,
    pub status: ReservationStatus,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
}

impl Reservation {
    /// Create or update a reservation by its unique key.
    ///
    /// Reservations are never deleted by the pipeline; re-processing a file
    /// (duplicate delivery, batched-mode redelivery) converges on the same
    /// committed state.
    pub async fn upsert<'e, E>(executor: E, row: &NewReservation) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO reservations
                (reservation_id, guest_name, status, check_in_date, check_out_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (reservation_id) DO UPDATE
               SET guest_name = EXCLUDED.guest_name,
                   status = EXCLUDED.status,
                   check_in_date = EXCLUDED.check_in_date,
                   check_out_date = EXCLUDED.check_out_date,
                   updated_at = now()
            "#,
        )
        .bind(&row.reservation_id)
        .bind(&row.guest_name)
        .bind(row.status)
        .bind(row.check_in_date)
        .bind(row.check_out_date)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(
        pool: &PgPool,
        reservation_id: &str,
    ) -> Result<Option<Reservation>, sqlx::Error> {
        sqlx::query_as::<_, Reservation>(
            r#"
            SELECT reservation_id, guest_name, status, check_in_date,
                   check_out_date, created_at, updated_at
              FROM reservations
             WHERE reservation_id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM reservations")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_from_str_accepts_known_values() {
        assert_eq!(
            ReservationStatus::from_str("PENDING"),
            Ok(ReservationStatus::Pending)
        );
        assert_eq!(
            ReservationStatus::from_str("CANCELED"),
            Ok(ReservationStatus::Canceled)
        );
        assert_eq!(
            ReservationStatus::from_str("COMPLETED"),
            Ok(ReservationStatus::Completed)
        );
    }

    #[test]
    fn test_status_from_str_rejects_unknown() {
        assert!(ReservationStatus::from_str("CANCELLED").is_err());
        assert!(ReservationStatus::from_str("pending").is_err());
        assert!(ReservationStatus::from_str("").is_err());
    }
}
