//! Page capability interface: everything the form engine needs from a browser page.

mod cdp;

pub use cdp::EokaPage;

use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

/// One `<option>` of a `<select>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectOption {
    pub value: String,
    /// Visible text, trimmed.
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// A label-wrapped checkbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Toggle {
    /// Label text, trimmed.
    pub label: String,
    /// `None` when the label wraps no input.
    pub checked: Option<bool>,
}

/// Native dialog type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Alert,
    Confirm,
    /// Prompts, beforeunload and anything else.
    #[serde(other)]
    Info,
}

impl fmt::Display for DialogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DialogKind::Alert => "alert",
            DialogKind::Confirm => "confirm",
            DialogKind::Info => "info",
        })
    }
}

/// A dialog raised by the page during a capture window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRecord {
    /// 1-based arrival order within the capture window.
    pub sequence: usize,
    pub kind: DialogKind,
    pub message: String,
    /// Page clock (ms since epoch) when the dialog was raised.
    pub timestamp_ms: u64,
}

impl fmt::Display for DialogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({}): {}", self.sequence, self.kind, self.message)
    }
}

/// Browser primitives the form engine is written against.
///
/// Every read goes to the live page: the site's own scripts change the form behind our
/// back, so nothing here may cache.
#[async_trait(?Send)]
pub trait FormPage {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn url(&self) -> Result<String>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Select the option with this exact value and fire `change`.
    async fn select_value(&self, selector: &str, value: &str) -> Result<()>;

    /// Fails with [`crate::Error::Timeout`] when nothing matches in time.
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    async fn wait_for_text(&self, text: &str, timeout_ms: u64) -> Result<()>;

    async fn wait_for_url(&self, fragment: &str, timeout_ms: u64) -> Result<()>;

    async fn wait_for_idle(&self, timeout_ms: u64) -> Result<()>;

    /// Fixed settle delay.
    async fn pause(&self, ms: u64);

    async fn count(&self, selector: &str) -> Result<usize>;

    /// Trimmed text of the first match.
    async fn text(&self, selector: &str) -> Result<Option<String>>;

    /// Attribute of every match, in document order (missing attributes are skipped).
    async fn attributes(&self, selector: &str, name: &str) -> Result<Vec<String>>;

    /// Visible text of the whole document.
    async fn body_text(&self) -> Result<String>;

    async fn options(&self, selector: &str) -> Result<Vec<SelectOption>>;

    /// Currently selected option, `None` when the select is missing or empty.
    async fn selected(&self, selector: &str) -> Result<Option<SelectOption>>;

    async fn toggles(&self, selector: &str) -> Result<Vec<Toggle>>;

    /// Click the `index`-th match of `selector`.
    async fn click_nth(&self, selector: &str, index: usize) -> Result<()>;

    /// For each `row` that has a `cell` containing `text`, a selector for its first
    /// `control`. Rows without a control are skipped.
    async fn row_controls(
        &self,
        row: &str,
        cell: &str,
        text: &str,
        control: &str,
    ) -> Result<Vec<String>>;

    /// Start recording dialogs and accepting them, in this document and in any document
    /// loaded before the hook is removed. Clears any previous log.
    /// With `accept_limit`, confirms beyond the limit are dismissed.
    async fn install_dialog_hook(&self, accept_limit: Option<usize>) -> Result<()>;

    /// Stop recording and return the final log in the order dialogs were raised.
    /// Must be called on every path out of a capture window.
    async fn remove_dialog_hook(&self) -> Result<Vec<DialogRecord>>;

    async fn screenshot(&self) -> Result<Vec<u8>>;
}
