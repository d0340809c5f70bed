//! Status derivation: pure functions of dates, the signed flag, and the
//! fulfilment checklist. Recomputed on every state change and by the daily
//! refresh job.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::contract::FulfilmentTerm;

/// Contract activity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Unsigned,
    Active,
    Inactive,
}

/// Fulfilment checklist status. Absent entirely when the contract does not
/// require fulfilment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfilmentStatus {
    Unfulfilled,
    PartiallyFulfilled,
    Fulfilled,
    Lapsed,
}

/// Active iff `start < today < end` (strict on both ends). A contract with
/// either boundary missing is treated as open-ended and reads Active.
pub fn activity_status(
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    today: NaiveDate,
) -> ContractStatus {
    match (start_date, end_date) {
        (Some(start), Some(end)) => {
            if start < today && today < end {
                ContractStatus::Active
            } else {
                ContractStatus::Inactive
            }
        }
        _ => ContractStatus::Active,
    }
}

/// Derive the fulfilment status from the checklist.
///
/// - `Fulfilled` iff every term is fulfilled
/// - `PartiallyFulfilled` iff some but not all are
/// - `Unfulfilled` iff none are (including an empty checklist)
/// - any non-`Fulfilled` value turns `Lapsed` once `today` is past the
///   deadline
///
/// Returns `None` when the contract does not require fulfilment.
pub fn fulfilment_status(
    requires_fulfilment: bool,
    terms: &[FulfilmentTerm],
    deadline: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<FulfilmentStatus> {
    if !requires_fulfilment {
        return None;
    }

    let progress = terms.iter().filter(|t| t.fulfilled).count();

    let mut status = if progress == 0 {
        FulfilmentStatus::Unfulfilled
    } else if progress < terms.len() {
        FulfilmentStatus::PartiallyFulfilled
    } else {
        FulfilmentStatus::Fulfilled
    };

    if status != FulfilmentStatus::Fulfilled {
        if let Some(deadline) = deadline {
            if today > deadline {
                status = FulfilmentStatus::Lapsed;
            }
        }
    }

    Some(status)
}

/// Derive the overall contract status.
///
/// A lapsed fulfilment forces `Inactive` regardless of dates; otherwise a
/// signed contract follows `activity_status` and an unsigned one reads
/// `Unsigned`.
pub fn contract_status(
    fulfilment: Option<FulfilmentStatus>,
    is_signed: bool,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    today: NaiveDate,
) -> ContractStatus {
    if fulfilment == Some(FulfilmentStatus::Lapsed) {
        return ContractStatus::Inactive;
    }

    if is_signed {
        activity_status(start_date, end_date, today)
    } else {
        ContractStatus::Unsigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn term(fulfilled: bool) -> FulfilmentTerm {
        FulfilmentTerm {
            requirement: "deliver".to_string(),
            fulfilled,
        }
    }

    #[test]
    fn activity_is_active_strictly_inside_the_window() {
        let today = date(2024, 6, 15);
        assert_eq!(
            activity_status(Some(date(2024, 6, 1)), Some(date(2024, 7, 1)), today),
            ContractStatus::Active
        );
        // Boundaries are exclusive.
        assert_eq!(
            activity_status(Some(today), Some(date(2024, 7, 1)), today),
            ContractStatus::Inactive
        );
        assert_eq!(
            activity_status(Some(date(2024, 6, 1)), Some(today), today),
            ContractStatus::Inactive
        );
    }

    #[test]
    fn activity_defaults_to_active_without_a_full_window() {
        let today = date(2024, 6, 15);
        assert_eq!(activity_status(None, None, today), ContractStatus::Active);
        assert_eq!(
            activity_status(Some(date(2024, 1, 1)), None, today),
            ContractStatus::Active
        );
        assert_eq!(
            activity_status(None, Some(date(2024, 1, 1)), today),
            ContractStatus::Active
        );
    }

    #[test]
    fn fulfilment_progress_buckets() {
        let today = date(2024, 6, 15);
        let none = vec![term(false), term(false)];
        let some = vec![term(true), term(false)];
        let all = vec![term(true), term(true)];

        assert_eq!(
            fulfilment_status(true, &none, None, today),
            Some(FulfilmentStatus::Unfulfilled)
        );
        assert_eq!(
            fulfilment_status(true, &some, None, today),
            Some(FulfilmentStatus::PartiallyFulfilled)
        );
        assert_eq!(
            fulfilment_status(true, &all, None, today),
            Some(FulfilmentStatus::Fulfilled)
        );
    }

    #[test]
    fn past_deadline_lapses_anything_unfulfilled() {
        let deadline = date(2024, 6, 1);
        let today = date(2024, 6, 2);
        let partial = vec![term(true), term(false)];
        let all = vec![term(true)];

        assert_eq!(
            fulfilment_status(true, &partial, Some(deadline), today),
            Some(FulfilmentStatus::Lapsed)
        );
        // A fulfilled checklist never lapses.
        assert_eq!(
            fulfilment_status(true, &all, Some(deadline), today),
            Some(FulfilmentStatus::Fulfilled)
        );
        // On the deadline day itself nothing lapses yet.
        assert_eq!(
            fulfilment_status(true, &partial, Some(deadline), deadline),
            Some(FulfilmentStatus::PartiallyFulfilled)
        );
    }

    #[test]
    fn no_fulfilment_requirement_means_no_status() {
        let today = date(2024, 6, 15);
        assert_eq!(fulfilment_status(false, &[term(false)], Some(date(2024, 1, 1)), today), None);
    }

    #[test]
    fn lapsed_fulfilment_forces_inactive_regardless_of_dates() {
        let today = date(2024, 6, 15);
        let status = contract_status(
            Some(FulfilmentStatus::Lapsed),
            true,
            Some(date(2024, 6, 1)),
            Some(date(2024, 7, 1)),
            today,
        );
        assert_eq!(status, ContractStatus::Inactive);
    }

    #[test]
    fn unsigned_contract_reads_unsigned() {
        let today = date(2024, 6, 15);
        let status = contract_status(None, false, Some(date(2024, 6, 1)), Some(date(2024, 7, 1)), today);
        assert_eq!(status, ContractStatus::Unsigned);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Fulfilled iff every term fulfilled; partial iff some but not
            /// all; unfulfilled iff none (no deadline in play).
            #[test]
            fn progress_buckets_partition(flags in proptest::collection::vec(any::<bool>(), 0..12)) {
                let terms: Vec<FulfilmentTerm> = flags
                    .iter()
                    .map(|&fulfilled| FulfilmentTerm {
                        requirement: "term".to_string(),
                        fulfilled,
                    })
                    .collect();
                let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();

                let status = fulfilment_status(true, &terms, None, today).unwrap();
                let done = flags.iter().filter(|f| **f).count();

                let expected = if done == 0 {
                    FulfilmentStatus::Unfulfilled
                } else if done < flags.len() {
                    FulfilmentStatus::PartiallyFulfilled
                } else {
                    FulfilmentStatus::Fulfilled
                };
                prop_assert_eq!(status, expected);
            }

            /// Once lapsed, the contract status is Inactive for every
            /// combination of dates and signing.
            #[test]
            fn lapsed_always_wins(
                signed in any::<bool>(),
                start_off in 0i64..700,
                len in 0i64..700,
            ) {
                let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
                let start = today - chrono::Duration::days(start_off);
                let end = start + chrono::Duration::days(len);

                let status = contract_status(
                    Some(FulfilmentStatus::Lapsed),
                    signed,
                    Some(start),
                    Some(end),
                    today,
                );
                prop_assert_eq!(status, ContractStatus::Inactive);
            }
        }
    }
}
