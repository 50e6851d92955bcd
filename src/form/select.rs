//! Day and time slot selection.

use crate::config::{FormSelectors, Timings};
use crate::page::{FormPage, SelectOption};
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Prompt text of the day select's placeholder option.
const DAY_PROMPT: &str = "選択して下さい";

/// The day that was picked and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayChoice {
    /// Matched the configured day.
    Preferred(SelectOption),
    /// Configured day missing; first open day instead.
    Fallback(SelectOption),
}

impl DayChoice {
    pub fn option(&self) -> &SelectOption {
        match self {
            DayChoice::Preferred(o) | DayChoice::Fallback(o) => o,
        }
    }

    /// Option value, e.g. `1:1`. Drift repair re-selects by this.
    pub fn value(&self) -> &str {
        &self.option().value
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, DayChoice::Fallback(_))
    }
}

fn is_day_placeholder(option: &SelectOption) -> bool {
    option.value.is_empty() || option.value == "0" || option.label.contains(DAY_PROMPT)
}

/// `"01"` and `"1"` name the same day.
fn same_day(label: &str, wanted: &str) -> bool {
    if wanted.is_empty() {
        return false;
    }
    label == wanted || label.trim_start_matches('0') == wanted.trim_start_matches('0')
}

/// Pick the wanted day, or the first open day when it is not offered.
///
/// `None` only when the select has no real options at all.
pub fn choose_day(options: &[SelectOption], wanted: &str) -> Option<DayChoice> {
    let mut days = options.iter().filter(|o| !is_day_placeholder(o));
    let first = days.clone().next()?;
    match days.find(|o| same_day(&o.label, wanted)) {
        Some(o) => Some(DayChoice::Preferred(o.clone())),
        None => Some(DayChoice::Fallback(first.clone())),
    }
}

/// Select the day and return what was selected.
pub async fn select_day<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    wanted: &str,
    timings: &Timings,
) -> Result<DayChoice> {
    page.wait_for_selector(&sel.day, timings.field_timeout_ms)
        .await?;

    let options = page.options(&sel.day).await?;
    let open: Vec<&str> = options
        .iter()
        .filter(|o| !is_day_placeholder(o))
        .map(|o| o.label.as_str())
        .take(10)
        .collect();
    debug!("open days: {}", open.join(", "));

    let choice = choose_day(&options, wanted).ok_or_else(|| Error::FieldNotFound {
        field: "day",
        wanted: wanted.to_string(),
        available: Vec::new(),
    })?;

    match &choice {
        DayChoice::Preferred(o) => info!("day '{}' (value={})", wanted, o.value),
        DayChoice::Fallback(o) if wanted.is_empty() => {
            info!("no day configured, taking first open day '{}' (value={})", o.label, o.value)
        }
        DayChoice::Fallback(o) => warn!(
            "day '{}' not offered, taking first open day '{}' (value={})",
            wanted, o.label, o.value
        ),
    }

    page.select_value(&sel.day, choice.value()).await?;
    page.pause(timings.short_ms).await;

    if let Some(now) = page.selected(&sel.day).await? {
        info!("day now shows '{}'", now.label);
    }
    Ok(choice)
}

/// Check time slots in priority order. Returns how many are confirmed checked.
///
/// A label the page does not offer is skipped; a click that does not stick is logged
/// and not counted.
pub async fn select_timeslots<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    wanted: &[String],
    timings: &Timings,
) -> Result<usize> {
    if wanted.is_empty() {
        debug!("no time slots configured");
        return Ok(0);
    }

    if let Err(e) = page
        .wait_for_selector(&sel.timeslots, timings.field_timeout_ms)
        .await
    {
        warn!("time slots not found: {}", e);
        return Ok(0);
    }

    let mut confirmed = 0;
    for want in wanted {
        let toggles = page.toggles(&sel.timeslots).await?;
        let Some((index, toggle)) = toggles
            .iter()
            .enumerate()
            .find(|(_, t)| t.label.contains(want.as_str()))
        else {
            warn!("time slot '{}' not offered", want);
            continue;
        };

        match toggle.checked {
            Some(true) => {
                debug!("'{}' already checked", toggle.label);
                confirmed += 1;
            }
            Some(false) => {
                page.click_nth(&sel.timeslots, index).await?;
                page.pause(timings.short_ms).await;
                let stuck = page
                    .toggles(&sel.timeslots)
                    .await?
                    .get(index)
                    .and_then(|t| t.checked)
                    .unwrap_or(false);
                if stuck {
                    info!("checked time slot '{}'", toggle.label);
                    confirmed += 1;
                } else {
                    warn!("time slot '{}' did not stay checked", toggle.label);
                }
            }
            None => warn!("time slot '{}' has no checkbox", toggle.label),
        }
    }

    if confirmed == 0 {
        warn!("no time slot could be checked");
    } else {
        info!("{} time slot(s) checked", confirmed);
    }
    Ok(confirmed)
}
