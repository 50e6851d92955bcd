use crate::config::WaitSpec;
use crate::{Error, Result};
use chrono::{Local, NaiveDateTime};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Longest single sleep while waiting for the start time.
const TICK_MS: i64 = 500;

/// How often the remaining time is logged.
const REPORT_EVERY: Duration = Duration::from_secs(10);

/// Block until the configured start time. Ctrl-C ends the wait with [`Error::Interrupted`].
pub async fn wait_until(spec: &WaitSpec) -> Result<()> {
    let Some(deadline) = spec.deadline(Local::now().naive_local()) else {
        info!("start time {} already reached, running now", spec);
        return Ok(());
    };

    info!("waiting until {} (Ctrl-C to cancel)", deadline);
    tokio::select! {
        _ = sleep_until(deadline) => {
            info!("start time reached");
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("wait cancelled");
            Err(Error::Interrupted)
        }
    }
}

async fn sleep_until(deadline: NaiveDateTime) {
    let mut reported = Instant::now();
    loop {
        let remaining = (deadline - Local::now().naive_local()).num_milliseconds();
        if remaining <= 0 {
            return;
        }
        if reported.elapsed() >= REPORT_EVERY {
            debug!("{}s until start", remaining / 1000);
            reported = Instant::now();
        }
        tokio::time::sleep(Duration::from_millis(tick(remaining))).await;
    }
}

fn tick(remaining_ms: i64) -> u64 {
    remaining_ms.clamp(1, TICK_MS) as u64
}
