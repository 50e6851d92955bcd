//! Facility resolution: open the reservation form of exactly the configured facility.

use crate::config::{FormSelectors, Timings};
use crate::page::{DialogRecord, FormPage};
use crate::{Error, Result};
use regex::Regex;
use std::fmt;
use tracing::{debug, info, warn};

/// Facility list entries logged at debug level.
const LOGGED_CANDIDATES: usize = 10;

/// Which facility to open. The id is authoritative; the name is a fallback and a
/// sanity check on the destination page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacilityTarget {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl FacilityTarget {
    /// Blank values count as absent.
    pub fn new(id: Option<String>, name: Option<String>) -> Self {
        let clean = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        Self {
            id: clean(id),
            name: clean(name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none()
    }
}

impl fmt::Display for FacilityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.id, &self.name) {
            (Some(id), Some(name)) => write!(f, "'{}' (id {})", name, id),
            (Some(id), None) => write!(f, "id {}", id),
            (None, Some(name)) => write!(f, "'{}'", name),
            (None, None) => f.write_str("(none)"),
        }
    }
}

/// How the facility control was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedBy {
    Id(String),
    Name(String),
}

impl fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedBy::Id(id) => write!(f, "facility_id={}", id),
            ResolvedBy::Name(name) => write!(f, "facility_name='{}'", name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub by: ResolvedBy,
    /// Facility name shown on the form page.
    pub title: Option<String>,
    /// Dialogs accepted while opening the form.
    pub dialogs: Vec<DialogRecord>,
}

/// Open the form of `target` from the facility list.
///
/// Never falls back to another facility: when neither id nor name resolves this fails
/// with [`Error::TargetNotFound`].
pub async fn resolve<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    target: &FacilityTarget,
    timings: &Timings,
) -> Result<ResolvedTarget> {
    info!("opening facility {}", target);
    log_candidates(page, sel).await;

    page.install_dialog_hook(Some(timings.facility_dialog_limit))
        .await?;
    let opened = open(page, sel, target, timings).await;
    let dialogs = page.remove_dialog_hook().await;
    let by = opened?;
    let dialogs = dialogs?;
    for d in &dialogs {
        debug!("facility dialog {}", d);
    }

    let title = page.text(&sel.facility_title).await.unwrap_or_else(|e| {
        debug!("facility title unreadable: {}", e);
        None
    });
    match (&title, &target.name) {
        (Some(title), Some(name)) if !title.contains(name.as_str()) => warn!(
            "facility page shows '{}', which does not contain '{}'",
            title, name
        ),
        (Some(title), _) => info!("facility page: '{}'", title),
        (None, _) => debug!("no facility title on form page"),
    }

    Ok(ResolvedTarget { by, title, dialogs })
}

async fn open<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    target: &FacilityTarget,
    timings: &Timings,
) -> Result<ResolvedBy> {
    let by = activate(page, sel, target).await?;
    info!("clicked facility control ({})", by);

    if let Err(e) = page.wait_for_idle(timings.navigation_timeout_ms).await {
        debug!("network did not go idle: {}", e);
    }
    page.wait_for_selector(&sel.month, timings.navigation_timeout_ms)
        .await?;
    page.wait_for_selector(&sel.room, timings.navigation_timeout_ms)
        .await?;
    Ok(by)
}

async fn activate<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    target: &FacilityTarget,
) -> Result<ResolvedBy> {
    let mut ambiguous_id = None;

    if let Some(ref id) = target.id {
        let selector = sel.facility_by_id(id);
        match page.count(&selector).await? {
            0 => warn!("no facility control for id {}", id),
            1 => {
                page.click(&selector).await?;
                return Ok(ResolvedBy::Id(id.clone()));
            }
            n => {
                warn!("{} facility controls for id {}", n, id);
                ambiguous_id = Some((id.clone(), selector));
            }
        }
    }

    if let Some(ref name) = target.name {
        let controls = page
            .row_controls(
                &sel.facility_row,
                &sel.facility_cell,
                name,
                &sel.facility_controls(),
            )
            .await?;
        debug!("{} row(s) for '{}'", controls.len(), name);
        if let Some(control) = controls.first() {
            page.click(control).await?;
            return Ok(ResolvedBy::Name(name.clone()));
        }
        warn!("no facility row for '{}'", name);
    }

    // Every control matched the same id, so the first one is still the right facility.
    if let Some((id, selector)) = ambiguous_id {
        page.click_nth(&selector, 0).await?;
        return Ok(ResolvedBy::Id(id));
    }

    Err(Error::TargetNotFound {
        id: target.id.clone(),
        name: target.name.clone(),
    })
}

/// Facility ids encoded in control attributes like `$.new_yoyaku(6, ...)`.
pub fn candidate_ids(attrs: &[String], call: &str) -> Vec<String> {
    let pattern = format!(r"^\s*{}\(\s*(\d+)\s*,", regex::escape(call));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    attrs
        .iter()
        .filter_map(|a| re.captures(a))
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

async fn log_candidates<P: FormPage + ?Sized>(page: &P, sel: &FormSelectors) {
    match page
        .attributes(&sel.facility_controls(), &sel.facility_id_attr)
        .await
    {
        Ok(attrs) => {
            let ids = candidate_ids(&attrs, &sel.facility_id_call);
            debug!(
                "{} facility controls, ids: {}",
                attrs.len(),
                ids.iter()
                    .take(LOGGED_CANDIDATES)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Err(e) => debug!("could not list facilities: {}", e),
    }
}
