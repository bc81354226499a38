//! Row validation for reservation spreadsheets.
//!
//! Rows are checked in document order; the first failing check wins and
//! the row is skipped. Duplicate tracking is per file: an id is counted as
//! seen once it reaches the duplicate check, so later occurrences are
//! reported against the first, whatever became of it.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::NaiveDate;

use rsvp_shared::models::reservation::{NewReservation, ReservationStatus};
use rsvp_shared::models::task::RowError;
use rsvp_shared::spreadsheet::RawRow;

pub const COLUMN_RESERVATION_ID: &str = "reservation_id";
pub const COLUMN_GUEST_NAME: &str = "guest_name";
pub const COLUMN_CHECK_IN: &str = "check_in_date";
pub const COLUMN_CHECK_OUT: &str = "check_out_date";
pub const COLUMN_STATUS: &str = "status";

const REQUIRED_COLUMNS: [&str; 5] = [
    COLUMN_RESERVATION_ID,
    COLUMN_GUEST_NAME,
    COLUMN_CHECK_IN,
    COLUMN_CHECK_OUT,
    COLUMN_STATUS,
];

/// Outcome of validating one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Valid(NewReservation),
    Invalid(RowError),
}

/// Stateful validator carrying the per-file duplicate set.
#[derive(Debug, Default)]
pub struct RowValidator {
    seen_ids: HashSet<String>,
}

impl RowValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&mut self, row: &RawRow) -> RowOutcome {
        let row_number = row.row_number();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| row.get(c).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            return RowOutcome::Invalid(RowError::at_row(
                row_number,
                format!("Missing required field(s): {}", missing.join(", ")),
            ));
        }

        let reservation_id = row.get(COLUMN_RESERVATION_ID).unwrap_or_default();
        if !self.seen_ids.insert(reservation_id.to_string()) {
            return RowOutcome::Invalid(RowError::at_row(
                row_number,
                format!("Duplicate reservation_id: {reservation_id}"),
            ));
        }

        let check_in_date = match parse_date(row.get(COLUMN_CHECK_IN).unwrap_or_default()) {
            Some(date) => date,
            None => {
                return RowOutcome::Invalid(RowError::at_row(
                    row_number,
                    format!(
                        "Invalid check_in_date: {} (expected YYYY-MM-DD)",
                        row.get(COLUMN_CHECK_IN).unwrap_or_default()
                    ),
                ));
            }
        };

        let check_out_date = match parse_date(row.get(COLUMN_CHECK_OUT).unwrap_or_default()) {
            Some(date) => date,
            None => {
                return RowOutcome::Invalid(RowError::at_row(
                    row_number,
                    format!(
                        "Invalid check_out_date: {} (expected YYYY-MM-DD)",
                        row.get(COLUMN_CHECK_OUT).unwrap_or_default()
                    ),
                ));
            }
        };

        if check_out_date <= check_in_date {
            return RowOutcome::Invalid(RowError::at_row(
                row_number,
                "check_out_date must be after check_in_date".to_string(),
            ));
        }

        let status_text = row.get(COLUMN_STATUS).unwrap_or_default();
        let status = match ReservationStatus::from_str(status_text) {
            Ok(status) => status,
            Err(()) => {
                return RowOutcome::Invalid(RowError::at_row(
                    row_number,
                    format!(
                        "Invalid status: {status_text} (expected PENDING, CANCELED or COMPLETED)"
                    ),
                ));
            }
        };

        RowOutcome::Valid(NewReservation {
            reservation_id: reservation_id.to_string(),
            guest_name: row.get(COLUMN_GUEST_NAME).unwrap_or_default().to_string(),
            status,
            check_in_date,
            check_out_date,
        })
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsvp_shared::spreadsheet::Sheet;

    const HEADERS: [&str; 5] = [
        "reservation_id",
        "guest_name",
        "check_in_date",
        "check_out_date",
        "status",
    ];

    fn row(cells: [&str; 5]) -> Vec<Option<String>> {
        cells
            .iter()
            .map(|c| {
                if c.is_empty() {
                    None
                } else {
                    Some(c.to_string())
                }
            })
            .collect()
    }

    fn validate_all(rows: &[Vec<Option<String>>]) -> Vec<RowOutcome> {
        let sheet = Sheet::from_rows(&HEADERS, rows);
        let mut validator = RowValidator::new();
        sheet.rows().iter().map(|r| validator.validate(r)).collect()
    }

    #[test]
    fn test_valid_row() {
        let outcomes = validate_all(&[row([
            "R-1",
            "Ada Lovelace",
            "2025-07-01",
            "2025-07-04",
            "PENDING",
        ])]);

        let RowOutcome::Valid(reservation) = &outcomes[0] else {
            panic!("expected valid row, got {:?}", outcomes[0]);
        };
        assert_eq!(reservation.reservation_id, "R-1");
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(
            reservation.check_out_date,
            NaiveDate::from_ymd_opt(2025, 7, 4).unwrap()
        );
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let outcomes = validate_all(&[row(["R-1", "", "2025-07-01", "", "PENDING"])]);

        let RowOutcome::Invalid(error) = &outcomes[0] else {
            panic!("expected invalid row");
        };
        assert_eq!(error.row, Some(2));
        assert!(error.error.contains("guest_name"));
        assert!(error.error.contains("check_out_date"));
        assert!(!error.error.contains("reservation_id"));
    }

    #[test]
    fn test_duplicate_reservation_id_first_wins() {
        let outcomes = validate_all(&[
            row(["R-1", "Ada", "2025-07-01", "2025-07-02", "PENDING"]),
            row(["R-2", "Grace", "2025-07-01", "2025-07-02", "PENDING"]),
            row(["R-1", "Hopper", "2025-08-01", "2025-08-02", "COMPLETED"]),
        ]);

        assert!(matches!(outcomes[0], RowOutcome::Valid(_)));
        assert!(matches!(outcomes[1], RowOutcome::Valid(_)));

        let RowOutcome::Invalid(error) = &outcomes[2] else {
            panic!("expected duplicate to be invalid");
        };
        assert_eq!(error.row, Some(4));
        assert_eq!(error.error, "Duplicate reservation_id: R-1");
    }

    #[test]
    fn test_id_counts_as_seen_even_when_row_is_later_invalid() {
        let outcomes = validate_all(&[
            row(["R-1", "Ada", "not-a-date", "2025-07-02", "PENDING"]),
            row(["R-1", "Ada", "2025-07-01", "2025-07-02", "PENDING"]),
        ]);

        let RowOutcome::Invalid(first) = &outcomes[0] else {
            panic!();
        };
        assert!(first.error.contains("check_in_date"));

        let RowOutcome::Invalid(second) = &outcomes[1] else {
            panic!("second occurrence should be a duplicate");
        };
        assert!(second.error.contains("Duplicate"));
    }

    #[test]
    fn test_unparseable_dates() {
        for bad in ["2025-13-01", "07/01/2025", "2025-07-1x", "tomorrow"] {
            let outcomes = validate_all(&[row(["R-1", "Ada", bad, "2025-07-02", "PENDING"])]);
            let RowOutcome::Invalid(error) = &outcomes[0] else {
                panic!("{bad} should fail");
            };
            assert!(error.error.contains("check_in_date"), "{bad}");
        }
    }

    #[test]
    fn test_check_out_must_be_after_check_in() {
        // Equal dates are rejected too.
        let outcomes = validate_all(&[
            row(["R-1", "Ada", "2025-07-02", "2025-07-01", "PENDING"]),
            row(["R-2", "Ada", "2025-07-01", "2025-07-01", "PENDING"]),
        ]);

        for outcome in &outcomes {
            let RowOutcome::Invalid(error) = outcome else {
                panic!("expected invalid");
            };
            assert!(error.error.contains("must be after"));
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        let outcomes = validate_all(&[row(["R-1", "Ada", "2025-07-01", "2025-07-02", "BOOKED"])]);
        let RowOutcome::Invalid(error) = &outcomes[0] else {
            panic!();
        };
        assert!(error.error.contains("Invalid status: BOOKED"));
    }

    #[test]
    fn test_scenario_mixed_errors_row_numbers() {
        // 5 rows: valid, duplicate, bad date, valid, bad status.
        let outcomes = validate_all(&[
            row(["R-1", "Ada", "2025-07-01", "2025-07-02", "PENDING"]),
            row(["R-1", "Grace", "2025-07-01", "2025-07-02", "PENDING"]),
            row(["R-2", "Edsger", "July 1st", "2025-07-02", "PENDING"]),
            row(["R-3", "Barbara", "2025-07-01", "2025-07-02", "CANCELED"]),
            row(["R-4", "Donald", "2025-07-01", "2025-07-02", "UNKNOWN"]),
        ]);

        let errors: Vec<(i64, &str)> = outcomes
            .iter()
            .filter_map(|o| match o {
                RowOutcome::Invalid(e) => Some((e.row.unwrap(), e.error.as_str())),
                RowOutcome::Valid(_) => None,
            })
            .collect();

        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].0, 3);
        assert_eq!(errors[1].0, 4);
        assert_eq!(errors[2].0, 6);
    }
}
