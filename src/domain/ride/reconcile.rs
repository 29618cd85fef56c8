//! Snapshot reconciliation
//!
//! Merges a server snapshot into the client view under the monotonic status
//! rule:
//!
//! - `REQUESTED → BOOKED`, `ACCEPTED → ARRIVING`, `STARTED → IN_TRIP` apply
//!   only when they move the stage strictly forward.
//! - `COMPLETED → IDLE` is always accepted and raises the feedback prompt
//!   once per booking.
//! - `CANCELLED` resets to the initial `IDLE` form.
//!
//! Non-status fields merge on every snapshot, including status no-ops.

use crate::domain::booking::{BookingSnapshot, BookingStatus};

use super::model::{ClientRideState, ClientRideStatus};

/// What a reconciliation did to the client status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status moved forward
    Advanced {
        from: ClientRideStatus,
        to: ClientRideStatus,
    },
    /// Ride finished; feedback prompt raised
    Completed,
    /// Ride cancelled; state reset
    Cancelled,
    /// Stale, duplicate or equal-stage snapshot
    Unchanged,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advanced { .. } => "advanced",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Unchanged => "unchanged",
        }
    }

    pub fn changed_status(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Result of [`reconcile`]
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub state: ClientRideState,
    pub transition: Transition,
}

/// Client status a server status projects onto.
pub fn target_status(status: BookingStatus) -> ClientRideStatus {
    match status {
        BookingStatus::Requested => ClientRideStatus::Booked,
        BookingStatus::Accepted => ClientRideStatus::Arriving,
        BookingStatus::Started => ClientRideStatus::InTrip,
        BookingStatus::Completed | BookingStatus::Cancelled => ClientRideStatus::Idle,
    }
}

/// Merge `snapshot` into `current`.
///
/// Pure; the caller persists and renders the returned state.
pub fn reconcile(current: &ClientRideState, snapshot: &BookingSnapshot) -> Reconciliation {
    if snapshot.status == BookingStatus::Cancelled {
        return Reconciliation {
            state: ClientRideState::default(),
            transition: Transition::Cancelled,
        };
    }

    let mut next = current.clone();

    let transition = match snapshot.status {
        BookingStatus::Completed => {
            if current.status != ClientRideStatus::Idle {
                next.status = ClientRideStatus::Idle;
                next.awaiting_feedback = true;
                Transition::Completed
            } else {
                Transition::Unchanged
            }
        }
        status => {
            let target = target_status(status);
            // a completed ride never re-enters an earlier stage
            if !current.is_completed() && target.stage() > current.status.stage() {
                next.status = target;
                Transition::Advanced {
                    from: current.status,
                    to: target,
                }
            } else {
                Transition::Unchanged
            }
        }
    };

    if let Some(position) = snapshot.driver_position() {
        next.driver_location = Some(position);
    }
    next.details
        .get_or_insert_with(Default::default)
        .merge_from(&snapshot.details);
    if next.booking_id.is_none() {
        next.booking_id = Some(snapshot.id.clone());
    }

    Reconciliation {
        state: next,
        transition,
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::{BookingDetails, BookingId, GeoPoint};
    use crate::domain::ride::RouteChoice;

    fn snap(status: BookingStatus) -> BookingSnapshot {
        BookingSnapshot::new("42", status)
    }

    fn apply_all(start: ClientRideState, snapshots: &[BookingSnapshot]) -> ClientRideState {
        snapshots
            .iter()
            .fold(start, |state, s| reconcile(&state, s).state)
    }

    fn booked() -> ClientRideState {
        ClientRideState::booked(BookingId::new("42"), Some(RouteChoice::new("fastest")))
    }

    #[test]
    fn forward_sequence_ends_on_last_mapped_status() {
        let sequences = [
            vec![BookingStatus::Requested],
            vec![BookingStatus::Requested, BookingStatus::Accepted],
            vec![BookingStatus::Accepted, BookingStatus::Accepted, BookingStatus::Started],
            vec![BookingStatus::Requested, BookingStatus::Started],
        ];
        for seq in sequences {
            let snapshots: Vec<_> = seq.iter().copied().map(snap).collect();
            let last = *seq.last().unwrap();
            let state = apply_all(ClientRideState::default(), &snapshots);
            assert_eq!(state.status, target_status(last), "sequence {:?}", seq);
        }
    }

    #[test]
    fn full_ride_scenario() {
        let snapshots = [
            snap(BookingStatus::Requested),
            snap(BookingStatus::Accepted),
            snap(BookingStatus::Started).with_driver_position(GeoPoint::new(12.9, 77.6)),
            snap(BookingStatus::Completed),
        ];
        let state = apply_all(ClientRideState::default(), &snapshots);
        assert_eq!(state.status, ClientRideStatus::Idle);
        assert!(state.awaiting_feedback);
        assert_eq!(state.driver_location, Some(GeoPoint::new(12.9, 77.6)));
    }

    #[test]
    fn earlier_stage_is_a_status_noop_but_merges_position() {
        let in_trip = ClientRideState {
            status: ClientRideStatus::InTrip,
            ..booked()
        };
        let result = reconcile(
            &in_trip,
            &snap(BookingStatus::Accepted).with_driver_position(GeoPoint::new(1.5, 2.5)),
        );
        assert_eq!(result.transition, Transition::Unchanged);
        assert_eq!(result.state.status, ClientRideStatus::InTrip);
        assert_eq!(result.state.driver_location, Some(GeoPoint::new(1.5, 2.5)));
    }

    #[test]
    fn equal_stage_is_a_noop() {
        let arriving = ClientRideState {
            status: ClientRideStatus::Arriving,
            ..booked()
        };
        let result = reconcile(&arriving, &snap(BookingStatus::Accepted));
        assert_eq!(result.transition, Transition::Unchanged);
        assert_eq!(result.state.status, ClientRideStatus::Arriving);
    }

    #[test]
    fn missing_position_keeps_known_location() {
        let state = ClientRideState {
            driver_location: Some(GeoPoint::new(1.0, 2.0)),
            ..booked()
        };
        let result = reconcile(&state, &snap(BookingStatus::Accepted));
        assert_eq!(result.state.status, ClientRideStatus::Arriving);
        assert_eq!(result.state.driver_location, Some(GeoPoint::new(1.0, 2.0)));
    }

    #[test]
    fn repeated_completion_prompts_once() {
        let in_trip = ClientRideState {
            status: ClientRideStatus::InTrip,
            ..booked()
        };
        let first = reconcile(&in_trip, &snap(BookingStatus::Completed));
        assert_eq!(first.transition, Transition::Completed);
        assert!(first.state.awaiting_feedback);

        let second = reconcile(&first.state, &snap(BookingStatus::Completed));
        assert_eq!(second.transition, Transition::Unchanged);
        assert!(second.state.awaiting_feedback);
    }

    #[test]
    fn completion_from_idle_without_ride_does_not_prompt() {
        let result = reconcile(&ClientRideState::default(), &snap(BookingStatus::Completed));
        assert_eq!(result.transition, Transition::Unchanged);
        assert!(!result.state.awaiting_feedback);
    }

    #[test]
    fn stale_progress_after_completion_is_ignored() {
        let done = reconcile(
            &ClientRideState {
                status: ClientRideStatus::InTrip,
                ..booked()
            },
            &snap(BookingStatus::Completed),
        )
        .state;
        let result = reconcile(&done, &snap(BookingStatus::Started));
        assert_eq!(result.transition, Transition::Unchanged);
        assert_eq!(result.state.status, ClientRideStatus::Idle);
        assert!(result.state.awaiting_feedback);
    }

    #[test]
    fn cancellation_resets_from_any_stage() {
        for status in [
            ClientRideStatus::Booked,
            ClientRideStatus::Arriving,
            ClientRideStatus::InTrip,
        ] {
            let state = ClientRideState {
                status,
                driver_location: Some(GeoPoint::new(3.0, 4.0)),
                ..booked()
            };
            let result = reconcile(&state, &snap(BookingStatus::Cancelled));
            assert_eq!(result.transition, Transition::Cancelled);
            assert_eq!(result.state, ClientRideState::default());
        }
    }

    #[test]
    fn details_merge_even_when_status_is_stale() {
        let arriving = ClientRideState {
            status: ClientRideStatus::Arriving,
            ..booked()
        };
        let corrected = snap(BookingStatus::Requested).with_details(BookingDetails {
            price: Some(212.5),
            ..Default::default()
        });
        let result = reconcile(&arriving, &corrected);
        assert_eq!(result.state.status, ClientRideStatus::Arriving);
        assert_eq!(result.state.details.unwrap().price, Some(212.5));
    }

    #[test]
    fn active_route_is_never_touched() {
        let state = booked();
        let result = reconcile(&state, &snap(BookingStatus::Started));
        assert_eq!(result.state.active_route, state.active_route);
    }
}
