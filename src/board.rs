//! What the caretaker currently sees for the selected kid and date.
//!
//! Each selection issues a [`FetchTicket`]. Only the completion carrying the
//! most recently issued ticket may replace the snapshot, so a slow response
//! for an earlier selection can never overwrite a newer one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::attendance::{AttendanceStatus, derive_status};
use crate::models::AttendanceDay;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub kid_uuid: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
    pub selection: Selection,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Found(AttendanceDay),
    NoData,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub selection: Option<Selection>,
    pub record: Option<AttendanceDay>,
    /// Latest known status per kid uuid.
    pub statuses: HashMap<String, AttendanceStatus>,
    pub loading: bool,
}

#[derive(Debug, Default)]
pub struct AttendanceBoard {
    issued: u64,
    snapshot: Arc<BoardSnapshot>,
}

impl AttendanceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Switches to `kid_uuid` on `date`. The previously shown record is
    /// dropped until the new fetch completes.
    pub fn select(&mut self, kid_uuid: &str, date: NaiveDate) -> FetchTicket {
        self.issued += 1;
        let selection = Selection {
            kid_uuid: kid_uuid.to_string(),
            date,
        };

        self.snapshot = Arc::new(BoardSnapshot {
            selection: Some(selection.clone()),
            record: None,
            statuses: self.snapshot.statuses.clone(),
            loading: true,
        });

        FetchTicket {
            seq: self.issued,
            selection,
        }
    }

    /// Applies a finished fetch. Returns `false` when the ticket has been
    /// superseded and the outcome was discarded.
    pub fn complete(&mut self, ticket: &FetchTicket, outcome: FetchOutcome) -> bool {
        if ticket.seq != self.issued {
            debug!(
                "discarding stale attendance fetch #{} for {} (latest #{})",
                ticket.seq, ticket.selection.kid_uuid, self.issued
            );
            return false;
        }

        let Selection { kid_uuid, date } = &ticket.selection;
        let mut statuses = self.snapshot.statuses.clone();

        let record = match outcome {
            FetchOutcome::Found(day) if !day.is_empty() => {
                match derive_status(&day, *date) {
                    Some(status) => {
                        statuses.insert(kid_uuid.clone(), status);
                    }
                    None => {
                        statuses.remove(kid_uuid);
                    }
                }
                Some(day)
            }
            FetchOutcome::Found(_) | FetchOutcome::NoData => {
                statuses.remove(kid_uuid);
                None
            }
            FetchOutcome::Failed => None,
        };

        self.snapshot = Arc::new(BoardSnapshot {
            selection: Some(ticket.selection.clone()),
            record,
            statuses,
            loading: false,
        });
        true
    }
}
