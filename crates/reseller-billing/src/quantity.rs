//! Billable seat quantity

use reseller_common::DailySnapshot;

/// Seats to bill for one snapshot day
///
/// Commitment plans bill the contracted seats, flexible plans bill licensed
/// seats. Counts at or above `anomaly_threshold` come from corrupt feeds and
/// fall back to the licensed count.
pub fn billable_quantity(snapshot: &DailySnapshot, anomaly_threshold: i64) -> i64 {
    let Some(subscription) = snapshot.subscription.as_ref() else {
        return 0;
    };
    let Some(seats) = subscription.seats.as_ref() else {
        return 0;
    };

    let is_commitment = subscription
        .plan
        .as_ref()
        .map(|p| p.is_commitment_plan)
        .unwrap_or(false);

    let mut quantity = if is_commitment {
        // Upstream listings have reported fewer contracted seats than assigned licenses
        seats.number_of_seats.max(seats.licensed_number_of_seats)
    } else if snapshot.override_plan().is_some_and(|p| p.is_commitment_plan) {
        seats.maximum_number_of_seats
    } else {
        seats.licensed_number_of_seats
    };

    if quantity >= anomaly_threshold {
        tracing::debug!(
            "[g-suite] seat count {} for {} on {} clamped to licensed seats",
            quantity,
            snapshot.subscription_id,
            snapshot.date
        );
        quantity = seats.licensed_number_of_seats;
    }

    quantity
}
