//! Month and room convergence.
//!
//! Changing either select makes the site redraw the other, so a change can silently undo
//! the previous one. Each attempt re-reads both fields instead of assuming progress.

use super::FormIntent;
use crate::config::{FormSelectors, Timings};
use crate::page::{FormPage, SelectOption};
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// What one convergence cycle should change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergenceStep {
    pub select_month: bool,
    pub select_room: bool,
}

impl ConvergenceStep {
    pub fn is_stable(&self) -> bool {
        !self.select_month && !self.select_room
    }
}

/// Decide which of the two fields need (re)selecting.
pub fn plan_convergence(
    intent: &FormIntent,
    month_value: Option<&str>,
    room_label: Option<&str>,
) -> ConvergenceStep {
    ConvergenceStep {
        select_month: !intent.month_matches(month_value),
        select_room: !intent.room_matches(room_label),
    }
}

/// Result of [`converge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    /// Both fields held their desired values at the end of this attempt.
    Stable { attempts: u32 },
    /// Attempts ran out; what the fields held at the end.
    Partial {
        month_value: Option<String>,
        room_label: Option<String>,
    },
}

impl Convergence {
    pub fn is_stable(&self) -> bool {
        matches!(self, Convergence::Stable { .. })
    }
}

/// Room options that stand for "nothing selected" are coded `0` or `0...`.
fn is_room_placeholder(option: &SelectOption) -> bool {
    option.value.is_empty() || option.value.starts_with('0')
}

/// Drive month and room to the intent, up to `converge_attempts` times.
///
/// Fails only when the room list is populated and nothing in it matches; running out of
/// attempts is reported as [`Convergence::Partial`].
pub async fn converge<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    intent: &FormIntent,
    timings: &Timings,
) -> Result<Convergence> {
    let attempts = timings.converge_attempts.max(1);

    for attempt in 1..=attempts {
        let month = current_value(page, &sel.month).await?;
        if plan_convergence(intent, month.as_deref(), None).select_month {
            pick_month(page, sel, intent, timings).await?;
        }

        page.pause(timings.medium_ms).await;

        let room = current_label(page, &sel.room).await?;
        if !intent.room_matches(room.as_deref()) {
            pick_room(page, sel, intent, timings, attempt == attempts).await?;
        }

        page.pause(timings.long_ms).await;

        let month = current_value(page, &sel.month).await?;
        let room = current_label(page, &sel.room).await?;
        if plan_convergence(intent, month.as_deref(), room.as_deref()).is_stable() {
            debug!("month & room stable after attempt {}", attempt);
            return Ok(Convergence::Stable { attempts: attempt });
        }
        debug!(
            "attempt {}/{}: month={:?} room={:?}, retrying",
            attempt, attempts, month, room
        );
    }

    let month_value = current_value(page, &sel.month).await?;
    let room_label = current_label(page, &sel.room).await?;
    warn!(
        "month/room did not settle after {} attempts (month={:?}, room={:?})",
        attempts, month_value, room_label
    );
    Ok(Convergence::Partial {
        month_value,
        room_label,
    })
}

async fn current_value<P: FormPage + ?Sized>(page: &P, selector: &str) -> Result<Option<String>> {
    Ok(page.selected(selector).await?.map(|o| o.value))
}

async fn current_label<P: FormPage + ?Sized>(page: &P, selector: &str) -> Result<Option<String>> {
    Ok(page.selected(selector).await?.map(|o| o.label))
}

async fn pick_month<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    intent: &FormIntent,
    timings: &Timings,
) -> Result<()> {
    if let Err(e) = page
        .wait_for_selector(&sel.month, timings.field_timeout_ms)
        .await
    {
        warn!("month select not ready: {}", e);
        return Ok(());
    }

    let options = page.options(&sel.month).await?;
    if !options.is_empty() && !options.iter().any(|o| o.value == intent.month_value) {
        return Err(Error::FieldNotFound {
            field: "month",
            wanted: intent.month_value.clone(),
            available: options
                .iter()
                .filter(|o| !o.value.is_empty() && o.value != "0")
                .map(|o| format!("{} ({})", o.label, o.value))
                .collect(),
        });
    }

    match page.select_value(&sel.month, &intent.month_value).await {
        Ok(()) => debug!("month set to {}", intent.month_value),
        Err(e) => warn!("selecting month {} failed: {}", intent.month_value, e),
    }
    page.pause(timings.short_ms).await;
    Ok(())
}

async fn pick_room<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    intent: &FormIntent,
    timings: &Timings,
    last_attempt: bool,
) -> Result<()> {
    if let Err(e) = page
        .wait_for_selector(&sel.room, timings.field_timeout_ms)
        .await
    {
        warn!("room select not ready: {}", e);
        return Ok(());
    }

    let options = page.options(&sel.room).await?;
    let rooms: Vec<&SelectOption> = options.iter().filter(|o| !is_room_placeholder(o)).collect();
    if !rooms.is_empty() {
        debug!(
            "rooms: {}",
            rooms.iter().map(|o| o.label.as_str()).collect::<Vec<_>>().join(", ")
        );
    }

    if let Some(room) = rooms
        .iter()
        .find(|o| o.label.contains(intent.room_matcher.as_str()))
    {
        info!("room: '{}' (value={})", room.label, room.value);
        page.select_value(&sel.room, &room.value).await?;
        page.pause(timings.short_ms).await;
        return Ok(());
    }

    // An empty list usually means the month change is still redrawing it.
    if rooms.is_empty() && !last_attempt {
        debug!("room list is empty, waiting for redraw");
        return Ok(());
    }

    Err(Error::FieldNotFound {
        field: "room",
        wanted: intent.room_matcher.clone(),
        available: rooms.iter().map(|o| o.label.clone()).collect(),
    })
}
