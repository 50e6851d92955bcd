//! The form engine: facility resolution, month/room convergence, day and time slot
//! selection, drift repair and submission classification.
//!
//! Every step talks to a [`FormPage`] and re-reads the live page before trusting
//! anything, since the site's scripts redraw and reset fields on their own.

pub mod converge;
pub mod drift;
pub mod select;
pub mod submit;
pub mod target;

pub use converge::{converge, plan_convergence, Convergence, ConvergenceStep};
pub use drift::{plan_repair, verify, DriftReport, RepairPlan};
pub use select::{choose_day, select_day, select_timeslots, DayChoice};
pub use submit::{classify, submit, Outcome, Signals, Submission, SubmissionReport};
pub use target::{resolve, FacilityTarget, ResolvedBy, ResolvedTarget};

use crate::config::{FormSelectors, Timings};
use crate::page::FormPage;
use crate::Result;
use std::fmt;
use tracing::{debug, info};

/// The committed state a run is after. Fixed for the whole fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormIntent {
    /// Option value of the month select.
    pub month_value: String,
    /// Displayed day, compared ignoring leading zeros. Empty means "first open day".
    pub day_label: String,
    /// Substring of the room label.
    pub room_matcher: String,
    /// Time slot labels in priority order.
    pub timeslot_priority: Vec<String>,
}

impl FormIntent {
    pub fn month_matches(&self, value: Option<&str>) -> bool {
        matches!(value, Some(v) if !month_unset(v) && v == self.month_value)
    }

    pub fn room_matches(&self, label: Option<&str>) -> bool {
        matches!(label, Some(l) if l.contains(self.room_matcher.as_str()))
    }
}

fn month_unset(value: &str) -> bool {
    value.is_empty() || value == "0"
}

/// Form state as read from the page in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedFormState {
    pub month_value: Option<String>,
    pub room_label: Option<String>,
    pub day_value: Option<String>,
    pub checked_timeslot_labels: Vec<String>,
}

impl ObservedFormState {
    pub async fn read<P: FormPage + ?Sized>(page: &P, sel: &FormSelectors) -> Result<Self> {
        Ok(Self {
            month_value: page.selected(&sel.month).await?.map(|o| o.value),
            room_label: page.selected(&sel.room).await?.map(|o| o.label),
            day_value: page.selected(&sel.day).await?.map(|o| o.value),
            checked_timeslot_labels: checked_labels(page, sel).await?,
        })
    }
}

async fn checked_labels<P: FormPage + ?Sized>(page: &P, sel: &FormSelectors) -> Result<Vec<String>> {
    Ok(page
        .toggles(&sel.timeslots)
        .await?
        .into_iter()
        .filter(|t| t.checked == Some(true))
        .map(|t| t.label)
        .collect())
}

/// What the form shows at the end of a fill, as display labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSnapshot {
    pub month: Option<String>,
    pub room: Option<String>,
    pub day: Option<String>,
    pub timeslots: Vec<String>,
}

impl FormSnapshot {
    pub async fn read<P: FormPage + ?Sized>(page: &P, sel: &FormSelectors) -> Result<Self> {
        Ok(Self {
            month: page.selected(&sel.month).await?.map(|o| o.label),
            room: page.selected(&sel.room).await?.map(|o| o.label),
            day: page.selected(&sel.day).await?.map(|o| o.label),
            timeslots: checked_labels(page, sel).await?,
        })
    }
}

impl fmt::Display for FormSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "(unset)".into());
        writeln!(f, "month:     {}", show(&self.month))?;
        writeln!(f, "room:      {}", show(&self.room))?;
        writeln!(f, "day:       {}", show(&self.day))?;
        if self.timeslots.is_empty() {
            write!(f, "timeslots: (none)")
        } else {
            write!(f, "timeslots: {}", self.timeslots.join(", "))
        }
    }
}

/// Everything the fill steps found out.
#[derive(Debug, Clone)]
pub struct FillReport {
    pub convergence: Convergence,
    pub day: DayChoice,
    /// Time slots confirmed checked by the selection pass.
    pub slots_confirmed: usize,
    pub drift: DriftReport,
}

impl FillReport {
    pub fn snapshot(&self) -> &FormSnapshot {
        &self.drift.snapshot
    }
}

/// Fill month, room, day and time slots, then verify nothing drifted.
///
/// A partial convergence is not an error; the report carries it and the snapshot shows
/// what the form actually holds.
pub async fn fill_form<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    intent: &FormIntent,
    timings: &Timings,
) -> Result<FillReport> {
    debug!(
        "fill start: month={}, day='{}', room~'{}', timeslots={:?}",
        intent.month_value, intent.day_label, intent.room_matcher, intent.timeslot_priority
    );

    let convergence = converge(page, sel, intent, timings).await?;

    // The site builds the day select and slot list after month/room settle.
    page.pause(timings.render_ms).await;

    let day = select_day(page, sel, &intent.day_label, timings).await?;
    let slots_confirmed =
        select_timeslots(page, sel, &intent.timeslot_priority, timings).await?;
    let drift = verify(page, sel, intent, day.value(), slots_confirmed, timings).await?;

    info!("fill done");
    Ok(FillReport {
        convergence,
        day,
        slots_confirmed,
        drift,
    })
}
