//! Drift repair: the site's scripts sometimes clear the day or uncheck time slots a
//! moment after we set them.

use super::select::select_timeslots;
use super::{FormIntent, FormSnapshot, ObservedFormState};
use crate::config::{FormSelectors, Timings};
use crate::page::FormPage;
use crate::Result;
use tracing::{debug, info, warn};

/// Repairs one verification cycle should make.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairPlan {
    pub reselect_day: bool,
    pub recheck_slots: bool,
}

impl RepairPlan {
    pub fn is_clean(&self) -> bool {
        !self.reselect_day && !self.recheck_slots
    }
}

/// Compare what we chose with what the page now shows.
///
/// `slots_confirmed` counts the time slots that stuck when they were first clicked;
/// labels the page never offered are not a drift.
pub fn plan_repair(
    chosen_day: &str,
    observed: &ObservedFormState,
    slots_confirmed: usize,
) -> RepairPlan {
    RepairPlan {
        reselect_day: observed.day_value.as_deref() != Some(chosen_day),
        recheck_slots: observed.checked_timeslot_labels.len() < slots_confirmed,
    }
}

/// Outcome of [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftReport {
    /// Verification cycles run.
    pub cycles: u32,
    /// Cycles that had to repair something.
    pub repairs: u32,
    /// The last check found nothing to repair.
    pub clean: bool,
    /// Final form state, read after the last cycle.
    pub snapshot: FormSnapshot,
}

/// Wait, re-check day and time slots, repair what drifted; at most `verify_attempts`
/// cycles. Always ends by reading and logging the final form state.
pub async fn verify<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    intent: &FormIntent,
    chosen_day: &str,
    slots_confirmed: usize,
    timings: &Timings,
) -> Result<DriftReport> {
    let mut cycles = 0;
    let mut repairs = 0;
    let mut clean = false;

    for cycle in 1..=timings.verify_attempts {
        cycles = cycle;
        page.pause(timings.long_ms).await;

        let observed = ObservedFormState::read(page, sel).await?;
        let plan = plan_repair(chosen_day, &observed, slots_confirmed);
        debug!(
            "verify #{}: day={:?} (want {}), checked {}/{}",
            cycle,
            observed.day_value,
            chosen_day,
            observed.checked_timeslot_labels.len(),
            slots_confirmed
        );

        if plan.is_clean() {
            clean = true;
            break;
        }
        repairs += 1;

        if plan.reselect_day {
            match page.select_value(&sel.day, chosen_day).await {
                Ok(()) => {
                    page.pause(timings.short_ms).await;
                    debug!("re-selected day {} after reset", chosen_day);
                }
                Err(e) => warn!("re-selecting day {} failed: {}", chosen_day, e),
            }
        }
        if plan.recheck_slots {
            debug!(
                "re-checking time slots ({} checked)",
                observed.checked_timeslot_labels.len()
            );
            select_timeslots(page, sel, &intent.timeslot_priority, timings).await?;
        }
    }

    let snapshot = FormSnapshot::read(page, sel).await?;
    info!("final selection:");
    for line in snapshot.to_string().lines() {
        info!("  {}", line);
    }

    Ok(DriftReport {
        cycles,
        repairs,
        clean,
        snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(day: Option<&str>, checked: &[&str]) -> ObservedFormState {
        ObservedFormState {
            month_value: Some("2025-11:4".into()),
            room_label: Some("多目的室".into()),
            day_value: day.map(String::from),
            checked_timeslot_labels: checked.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_plan_clean() {
        let plan = plan_repair("1:1", &observed(Some("1:1"), &["午前", "午後①"]), 2);
        assert!(plan.is_clean());
    }

    #[test]
    fn test_plan_day_reset() {
        let plan = plan_repair("1:1", &observed(Some("0"), &["午前"]), 1);
        assert_eq!(
            plan,
            RepairPlan {
                reselect_day: true,
                recheck_slots: false
            }
        );
        assert!(plan_repair("1:1", &observed(None, &[]), 0).reselect_day);
    }

    #[test]
    fn test_plan_slots_dropped() {
        let plan = plan_repair("1:1", &observed(Some("1:1"), &["午前"]), 2);
        assert!(!plan.reselect_day);
        assert!(plan.recheck_slots);
    }

    #[test]
    fn test_plan_no_slots_wanted() {
        assert!(plan_repair("1:1", &observed(Some("1:1"), &[]), 0).is_clean());
    }

    #[test]
    fn test_plan_ignores_slots_never_confirmed() {
        // Two labels wanted, only one offered and checked.
        assert!(plan_repair("1:1", &observed(Some("1:1"), &["午前"]), 1).is_clean());
    }
}
