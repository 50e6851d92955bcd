//! Submission and outcome classification.

use crate::config::{FormSelectors, SubmitMarkers, Timings};
use crate::page::{DialogRecord, FormPage};
use crate::{Error, Result};
use std::fmt;
use tracing::{debug, info, warn};

/// Longest on-page line kept as a failure message.
const MAX_MESSAGE_CHARS: usize = 200;

/// Failure lines kept per phrase.
const MESSAGES_PER_PHRASE: usize = 2;

/// Terminal classification of one submit click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Reached the confirmation page.
    Success,
    /// The site only said something through dialogs, e.g. that nothing more can be done.
    InfoOnly,
    /// Failure text on the page or dialogs alongside it.
    ErrorDetected,
    /// Nothing observable happened.
    Unknown,
}

impl Outcome {
    /// Whether the browser should stay open for the operator.
    pub fn keep_alive(self) -> bool {
        matches!(self, Outcome::Success | Outcome::Unknown)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Success => "success",
            Outcome::InfoOnly => "info only",
            Outcome::ErrorDetected => "error detected",
            Outcome::Unknown => "unknown",
        })
    }
}

/// Independent observations after the click.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signals {
    pub url_changed: bool,
    /// Confirmation-page token found in the URL.
    pub url_token: Option<String>,
    /// Confirmation-page phrase found on the page.
    pub confirmation_phrase: Option<String>,
    /// Failure phrases found on the page or in a dialog message.
    pub failure_phrases: Vec<String>,
    pub dialog_count: usize,
}

impl Signals {
    pub fn confirmed(&self) -> bool {
        self.url_changed || self.url_token.is_some() || self.confirmation_phrase.is_some()
    }
}

fn reached_confirmation(s: &Signals) -> bool {
    s.confirmed()
}

fn dialogs_without_failure(s: &Signals) -> bool {
    s.dialog_count > 0 && s.failure_phrases.is_empty()
}

fn failure_or_dialogs(s: &Signals) -> bool {
    !s.failure_phrases.is_empty() || s.dialog_count > 0
}

/// Checked top to bottom; first match wins. A confirmed page transition outranks any
/// dialog raised on the way.
const DECISION_TABLE: &[(fn(&Signals) -> bool, Outcome)] = &[
    (reached_confirmation, Outcome::Success),
    (dialogs_without_failure, Outcome::InfoOnly),
    (failure_or_dialogs, Outcome::ErrorDetected),
];

pub fn classify(signals: &Signals) -> Outcome {
    DECISION_TABLE
        .iter()
        .find(|(rule, _)| rule(signals))
        .map(|(_, outcome)| *outcome)
        .unwrap_or(Outcome::Unknown)
}

/// What [`submit`] ended with.
#[derive(Debug, Clone)]
pub enum Submission {
    /// The submit control never showed up; the operator has to finish by hand.
    Handoff { dialogs: Vec<DialogRecord> },
    Classified(SubmissionReport),
}

#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub outcome: Outcome,
    pub signals: Signals,
    /// Every dialog raised during the capture window, in arrival order.
    pub dialogs: Vec<DialogRecord>,
    /// Dialog messages worth showing to the operator.
    pub notices: Vec<String>,
    /// Short on-page lines containing failure phrases.
    pub failure_messages: Vec<String>,
    /// URL after the observation window.
    pub url: String,
}

/// Click submit, watch what happens, classify it.
pub async fn submit<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    markers: &SubmitMarkers,
    timings: &Timings,
) -> Result<Submission> {
    page.install_dialog_hook(None).await?;
    let pressed = press(page, sel, timings).await;
    let dialogs = page.remove_dialog_hook().await;
    let before = pressed?;
    let dialogs = dialogs?;

    for d in &dialogs {
        info!("dialog {}", d);
    }

    let Some(before) = before else {
        return Ok(Submission::Handoff { dialogs });
    };

    let url = page.url().await?;
    let body = page.body_text().await?;
    let signals = collect_signals(&before, &url, &body, &dialogs, markers);
    let outcome = classify(&signals);

    if signals.url_changed {
        info!("url changed: {} -> {}", before, url);
    }
    if let Some(ref token) = signals.url_token {
        info!("confirmation url ({}): {}", token, url);
    }
    if let Some(ref phrase) = signals.confirmation_phrase {
        info!("confirmation page text: '{}'", phrase);
    }
    if !signals.failure_phrases.is_empty() {
        warn!("failure text: {}", signals.failure_phrases.join(", "));
    }
    info!("submission outcome: {}", outcome);

    Ok(Submission::Classified(SubmissionReport {
        outcome,
        notices: notices(&dialogs, &markers.notice_keywords),
        failure_messages: failure_lines(&body, &markers.failure_phrases),
        signals,
        dialogs,
        url,
    }))
}

/// Returns the pre-click URL, or `None` when the control is missing.
async fn press<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    timings: &Timings,
) -> Result<Option<String>> {
    match page
        .wait_for_selector(&sel.submit, timings.submit_lookup_ms)
        .await
    {
        Ok(()) => {}
        Err(Error::Timeout(e)) => {
            warn!("submit control not found, manual handoff: {}", e);
            return Ok(None);
        }
        Err(e) => return Err(e),
    }

    let before = page.url().await?;
    page.click(&sel.submit).await?;
    debug!("clicked {}", sel.submit);
    page.pause(timings.submit_settle_ms).await;
    Ok(Some(before))
}

fn collect_signals(
    before: &str,
    after: &str,
    body: &str,
    dialogs: &[DialogRecord],
    markers: &SubmitMarkers,
) -> Signals {
    let url_lower = after.to_lowercase();
    let mut failure_phrases: Vec<String> = Vec::new();
    for phrase in &markers.failure_phrases {
        let on_page = body.contains(phrase.as_str());
        let in_dialog = dialogs.iter().any(|d| d.message.contains(phrase.as_str()));
        if (on_page || in_dialog) && !failure_phrases.contains(phrase) {
            failure_phrases.push(phrase.clone());
        }
    }

    Signals {
        url_changed: before != after,
        url_token: markers
            .url_tokens
            .iter()
            .find(|t| url_lower.contains(&t.to_lowercase()))
            .cloned(),
        confirmation_phrase: markers
            .confirmation_phrases
            .iter()
            .find(|p| body.contains(p.as_str()))
            .cloned(),
        failure_phrases,
        dialog_count: dialogs.len(),
    }
}

fn notices(dialogs: &[DialogRecord], keywords: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for d in dialogs {
        if keywords.iter().any(|k| d.message.contains(k.as_str())) && !out.contains(&d.message) {
            out.push(d.message.clone());
        }
    }
    out
}

fn failure_lines(body: &str, phrases: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for phrase in phrases {
        let lines = body
            .lines()
            .map(str::trim)
            .filter(|l| {
                !l.is_empty()
                    && l.contains(phrase.as_str())
                    && l.chars().count() < MAX_MESSAGE_CHARS
            })
            .take(MESSAGES_PER_PHRASE);
        for line in lines {
            if !out.iter().any(|o| o == line) {
                out.push(line.to_string());
            }
        }
    }
    out
}
