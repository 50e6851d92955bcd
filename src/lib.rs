//! # reserve-runner
//!
//! Drives a JavaScript-heavy reservation form (month → room → day → time slots → submit)
//! to a committed state, repairs the resets the site's own scripts cause, and classifies
//! what happened after the final submit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reserve_runner::{Config, Runner};
//!
//! # #[tokio::main]
//! # async fn main() -> reserve_runner::Result<()> {
//! let config = Config::load("reservation.yaml")?;
//! let mut runner = Runner::new(&config.browser, config.run.headless).await?;
//! let report = runner.run(&config).await?;
//! println!("Outcome: {}", report.outcome);
//! # Ok(())
//! # }
//! ```
//!
//! The engine itself only talks to a [`FormPage`], so every step can be driven against
//! something other than a live browser.

mod config;
pub mod form;
pub mod page;
mod runner;

pub use config::{
    BrowserConfig, Config, FormSelectors, LoginConfig, OnFailure, ParamDef, Params, Profile,
    ReservationConfig, RunConfig, SiteConfig, SubmitMarkers, Timings, Viewport, WaitSpec,
};
pub use form::{
    Convergence, DayChoice, DriftReport, FacilityTarget, FillReport, FormIntent, FormSnapshot,
    ObservedFormState, Outcome, Submission, SubmissionReport,
};
pub use page::{DialogKind, DialogRecord, EokaPage, FormPage, SelectOption, Toggle};
pub use runner::{login, open_menu, run_flow, wait_until, RunOutcome, RunReport, Runner};

/// Result type for reserve-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during config loading or a form run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("facility not found (id: {}, name: {})", display_opt(.id), display_opt(.name))]
    TargetNotFound {
        id: Option<String>,
        name: Option<String>,
    },

    #[error("{field}: no option matching '{wanted}' (available: {})", .available.join(", "))]
    FieldNotFound {
        field: &'static str,
        wanted: String,
        available: Vec<String>,
    },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("interrupted")]
    Interrupted,
}

fn display_opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}
