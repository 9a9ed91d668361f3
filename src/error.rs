//! The scheduler's error taxonomy (§7): `NoApplicationCanBeScheduled` is a
//! control-flow signal the round loop matches on explicitly, never a fault
//! that escapes to a caller; placement failures are programming errors that
//! propagate as `anyhow::Error` via `?`.

use crate::cluster::InvalidPlacement;

#[derive(Debug)]
pub enum ScheduleError {
    /// The current round cannot admit anything right now; the round loop
    /// breaks and awaits a completion callback.
    NoApplicationCanBeScheduled,
    /// Zero/negative container placement, or placement on a full node.
    Placement(InvalidPlacement),
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::NoApplicationCanBeScheduled => {
                write!(f, "no application can be scheduled right now")
            }
            ScheduleError::Placement(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ScheduleError {}

impl From<InvalidPlacement> for ScheduleError {
    fn from(e: InvalidPlacement) -> Self {
        ScheduleError::Placement(e)
    }
}
