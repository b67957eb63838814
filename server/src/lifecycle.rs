//! Swap lifecycle rules
//!
//! Pure state machine for swap status changes. Each legal edge carries the
//! counter delta that has to be applied to *both* participants in the same
//! write as the status change:
//!
//! | edge                         | actor               | delta (pending, completed) |
//! |------------------------------|---------------------|----------------------------|
//! | create -> pending            | requester           | (+1, 0)                    |
//! | pending -> accepted          | recipient           | (0, 0)                     |
//! | pending -> rejected          | recipient           | (-1, 0)                    |
//! | accepted -> completed        | either participant  | (-1, +1)                   |
//! | pending/accepted -> cancelled| either participant  | (-1, 0)                    |

use serde::Serialize;

use crate::models::{Participant, SwapStatus};

/// Change applied to `pending_swaps` / `completed_swaps` of both participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CounterDelta {
    pub pending: i32,
    pub completed: i32,
}

impl CounterDelta {
    pub const NONE: Self = Self {
        pending: 0,
        completed: 0,
    };

    /// Applied when a swap is first requested
    pub const CREATED: Self = Self {
        pending: 1,
        completed: 0,
    };

    pub fn is_zero(&self) -> bool {
        *self == Self::NONE
    }
}

/// Check whether `actor` may move a swap from `from` to `to`.
///
/// Returns the counter delta of the edge, or `None` when the edge does not
/// exist or the actor's role may not take it.
pub fn plan_transition(
    from: SwapStatus,
    to: SwapStatus,
    actor: Participant,
) -> Option<CounterDelta> {
    use Participant::{Recipient, Requester};
    use SwapStatus::*;

    match (from, to, actor) {
        (Pending, Accepted, Recipient) => Some(CounterDelta::NONE),
        (Pending, Rejected, Recipient) => Some(CounterDelta {
            pending: -1,
            completed: 0,
        }),
        (Accepted, Completed, Requester | Recipient) => Some(CounterDelta {
            pending: -1,
            completed: 1,
        }),
        (Pending | Accepted, Cancelled, Requester | Recipient) => Some(CounterDelta {
            pending: -1,
            completed: 0,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Participant::{Recipient, Requester};
    use SwapStatus::*;

    const ALL: [SwapStatus; 5] = [Pending, Accepted, Rejected, Completed, Cancelled];

    #[test]
    fn recipient_decides_pending_requests() {
        assert_eq!(
            plan_transition(Pending, Accepted, Recipient),
            Some(CounterDelta::NONE)
        );
        assert_eq!(plan_transition(Pending, Accepted, Requester), None);
        assert_eq!(plan_transition(Pending, Rejected, Requester), None);
        assert_eq!(
            plan_transition(Pending, Rejected, Recipient),
            Some(CounterDelta {
                pending: -1,
                completed: 0
            })
        );
    }

    #[test]
    fn completion_requires_acceptance() {
        assert_eq!(plan_transition(Pending, Completed, Requester), None);
        for actor in [Requester, Recipient] {
            assert_eq!(
                plan_transition(Accepted, Completed, actor),
                Some(CounterDelta {
                    pending: -1,
                    completed: 1
                })
            );
        }
    }

    #[test]
    fn either_side_cancels_open_swaps() {
        for from in [Pending, Accepted] {
            for actor in [Requester, Recipient] {
                assert_eq!(
                    plan_transition(from, Cancelled, actor).map(|d| d.pending),
                    Some(-1)
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                for actor in [Requester, Recipient] {
                    assert_eq!(plan_transition(from, to, actor), None, "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn no_edge_re_enters_pending() {
        for from in ALL {
            for actor in [Requester, Recipient] {
                assert_eq!(plan_transition(from, Pending, actor), None);
            }
        }
    }

    #[test]
    fn every_edge_closes_pending_exactly_once() {
        // Summed over a path from creation to any terminal state the pending
        // delta must net to zero and completed must be 0 or 1.
        let paths: [&[(SwapStatus, SwapStatus, Participant)]; 4] = [
            &[(Pending, Rejected, Recipient)],
            &[(Pending, Cancelled, Requester)],
            &[(Pending, Accepted, Recipient), (Accepted, Cancelled, Recipient)],
            &[(Pending, Accepted, Recipient), (Accepted, Completed, Requester)],
        ];
        for path in paths {
            let mut pending = CounterDelta::CREATED.pending;
            let mut completed = 0;
            for (from, to, actor) in path {
                let delta = plan_transition(*from, *to, *actor).expect("legal edge");
                pending += delta.pending;
                completed += delta.completed;
            }
            assert_eq!(pending, 0);
            assert!(completed == 0 || completed == 1);
        }
    }
}
