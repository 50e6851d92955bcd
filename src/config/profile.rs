/// Performance profile. Only delays and retry counts differ between profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Normal,
    Fast,
}

/// Delays and bounds used by every form step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Settle after a single select or click.
    pub short_ms: u64,
    /// Between the month and room steps of a convergence attempt.
    pub medium_ms: u64,
    /// End of a convergence attempt, and drift quiescence.
    pub long_ms: u64,
    /// Lets the site render the day and time slot fields after month/room settle.
    pub render_ms: u64,
    pub converge_attempts: u32,
    pub verify_attempts: u32,
    /// Lookup of a form field that should already be there.
    pub field_timeout_ms: u64,
    /// Page transitions (login, menu, facility).
    pub navigation_timeout_ms: u64,
    pub submit_lookup_ms: u64,
    /// Observation window after the submit click.
    pub submit_settle_ms: u64,
    /// Dialogs auto-accepted while opening a facility.
    pub facility_dialog_limit: usize,
}

impl Profile {
    pub fn timings(self) -> Timings {
        let base = Timings {
            short_ms: 200,
            medium_ms: 300,
            long_ms: 500,
            render_ms: 800,
            converge_attempts: 5,
            verify_attempts: 3,
            field_timeout_ms: 3_000,
            navigation_timeout_ms: 10_000,
            submit_lookup_ms: 3_000,
            submit_settle_ms: 2_000,
            facility_dialog_limit: 5,
        };
        match self {
            Profile::Normal => base,
            Profile::Fast => Timings {
                short_ms: 50,
                medium_ms: 150,
                long_ms: 300,
                render_ms: 400,
                converge_attempts: 3,
                verify_attempts: 2,
                ..base
            },
        }
    }
}
