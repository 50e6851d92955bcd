mod gate;
mod session;

pub use gate::wait_until;
pub use session::{login, open_menu};

use crate::config::{BrowserConfig, Config, Timings};
use crate::form::{self, FillReport, FormSnapshot, Outcome, ResolvedTarget, Submission};
use crate::page::{DialogRecord, EokaPage, FormPage};
use crate::Result;
use eoka::Browser;
use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Submit was clicked and the result classified.
    Submitted(Outcome),
    /// The submit control never appeared; the operator finishes by hand.
    Handoff,
}

impl RunOutcome {
    /// Whether the browser should stay open for the operator.
    pub fn keep_alive(self) -> bool {
        match self {
            RunOutcome::Submitted(outcome) => outcome.keep_alive(),
            RunOutcome::Handoff => true,
        }
    }

    pub fn is_failure(self) -> bool {
        self == RunOutcome::Submitted(Outcome::ErrorDetected)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Submitted(outcome) => write!(f, "{}", outcome),
            RunOutcome::Handoff => f.write_str("manual handoff required"),
        }
    }
}

/// Result of a full reservation run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Form state just before submit.
    pub snapshot: FormSnapshot,
    pub fill: FillReport,
    pub facility: ResolvedTarget,
    /// Dialogs raised around the submit click.
    pub dialogs: Vec<DialogRecord>,
    /// Dialog messages the site used to explain itself.
    pub notices: Vec<String>,
    /// Failure lines found on the result page.
    pub failure_messages: Vec<String>,
    /// URL after submit, when it was clicked.
    pub url: Option<String>,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl RunReport {
    pub fn keep_alive(&self) -> bool {
        self.outcome.keep_alive()
    }
}

/// Log in, open the facility, fill the form, submit and classify.
///
/// Works against any [`FormPage`]; [`Runner`] drives it with a real browser.
pub async fn run_flow<P: FormPage + ?Sized>(
    page: &P,
    config: &Config,
    timings: &Timings,
) -> Result<RunReport> {
    let start = Instant::now();
    let sel = &config.site.selectors;

    login(page, &config.login, &config.site, timings).await?;
    open_menu(page, sel, timings).await?;

    let facility = form::resolve(page, sel, &config.reservation.target(), timings).await?;
    info!("facility opened via {}", facility.by);

    let fill = form::fill_form(page, sel, &config.reservation.intent(), timings).await?;
    let snapshot = fill.snapshot().clone();

    let report = match form::submit(page, sel, &config.site.markers, timings).await? {
        Submission::Handoff { dialogs } => RunReport {
            outcome: RunOutcome::Handoff,
            snapshot,
            fill,
            facility,
            dialogs,
            notices: Vec::new(),
            failure_messages: Vec::new(),
            url: None,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        Submission::Classified(submitted) => RunReport {
            outcome: RunOutcome::Submitted(submitted.outcome),
            snapshot,
            fill,
            facility,
            dialogs: submitted.dialogs,
            notices: submitted.notices,
            failure_messages: submitted.failure_messages,
            url: Some(submitted.url),
            duration_ms: start.elapsed().as_millis() as u64,
        },
    };

    info!("run finished: {} ({}ms)", report.outcome, report.duration_ms);
    Ok(report)
}

/// Owns the browser for one reservation run.
pub struct Runner {
    browser: Browser,
    page: EokaPage,
}

impl Runner {
    /// Launch a browser with the given config.
    pub async fn new(config: &BrowserConfig, headless: bool) -> Result<Self> {
        let stealth = eoka::StealthConfig {
            headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
            viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            headless, config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page: EokaPage::new(page),
        })
    }

    pub fn page(&self) -> &EokaPage {
        &self.page
    }

    /// Run the config. A failed run leaves a screenshot when `on_failure.screenshot` is set.
    pub async fn run(&mut self, config: &Config) -> Result<RunReport> {
        let profile = config.run.profile();
        debug!("profile: {:?}", profile);
        let result = run_flow(&self.page, config, &profile.timings()).await;

        match &result {
            Ok(report) if report.outcome.is_failure() => self.handle_failure(config).await,
            Ok(_) => {}
            Err(e) => {
                warn!("run failed: {}", e);
                self.handle_failure(config).await;
            }
        }
        result
    }

    async fn handle_failure(&self, config: &Config) {
        let Some(path) = config.on_failure.as_ref().and_then(|f| f.screenshot.as_ref()) else {
            return;
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = path.replace("{timestamp}", &timestamp.to_string());
        info!("Saving failure screenshot to: {}", path);
        match self.page.screenshot().await {
            Ok(data) => {
                if let Err(e) = std::fs::write(&path, data) {
                    warn!("Failed to save screenshot: {}", e);
                }
            }
            Err(e) => warn!("Failed to take screenshot: {}", e),
        }
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}
