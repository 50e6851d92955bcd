use clap::Parser;
use reserve_runner::{Config, Outcome, RunOutcome, RunReport, Runner};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "reserve-runner")]
#[command(about = "Fill a reservation form up to the confirmation page")]
#[command(version)]
struct Cli {
    /// Config file to run
    config: PathBuf,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Use the fast profile (overrides config)
    #[arg(long)]
    fast: bool,

    /// Ignore run.wait_until_time and start immediately
    #[arg(long)]
    no_wait: bool,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate config without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> reserve_runner::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let params = reserve_runner::Params::from_args(&cli.params)?;
    let mut config = Config::load_with_params(&cli.config, &params)?;

    if cli.check {
        print_summary(&config)?;
        return Ok(());
    }

    if cli.headless {
        config.run.headless = true;
    }
    if cli.fast {
        config.run.fast_mode = true;
    }
    if cli.no_wait {
        config.run.wait_until_time = None;
    }

    println!("Running: {}", config.name);

    if let Some(spec) = config.run.wait_spec()? {
        reserve_runner::wait_until(&spec).await?;
    }

    let mut runner = Runner::new(&config.browser, config.run.headless).await?;
    let result = runner.run(&config).await;

    let (hold, failed) = match &result {
        Ok(report) => {
            print_report(report);
            (report.keep_alive(), report.outcome.is_failure())
        }
        Err(e) => {
            println!();
            println!("✗ Failed: {}", e);
            (!config.run.auto_close, true)
        }
    };

    if hold && !config.run.headless {
        println!();
        println!("Browser left open for you to finish. Press Ctrl-C to close it.");
        tokio::signal::ctrl_c().await?;
    }

    runner.close().await?;

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(config: &Config) -> reserve_runner::Result<()> {
    let r = &config.reservation;
    println!("Config valid: {}", config.name);
    println!("  Facility: {}", r.target());
    println!("  Month: {}", r.month_value);
    println!(
        "  Day: {}",
        if r.day_label.is_empty() {
            "(first open day)"
        } else {
            r.day_label.as_str()
        }
    );
    println!("  Room: contains '{}'", r.room_matcher);
    let slots = r.timeslot_priority();
    if slots.is_empty() {
        println!("  Time slots: (none)");
    } else {
        println!("  Time slots: {}", slots.join(" > "));
    }
    match config.run.wait_spec()? {
        Some(spec) => println!("  Start at: {}", spec),
        None => println!("  Start at: immediately"),
    }
    println!("  Profile: {:?}", config.run.profile());
    if !config.params.is_empty() {
        println!("  Parameters: {}", config.params.len());
        for (name, def) in &config.params {
            let req = if def.required { " (required)" } else { "" };
            let desc = def.description.as_deref().unwrap_or("");
            println!("    - {}{}: {}", name, req, desc);
        }
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    match report.outcome {
        RunOutcome::Submitted(Outcome::Success) => println!("✓ Reached the confirmation page"),
        RunOutcome::Submitted(Outcome::InfoOnly) => println!("ℹ The site answered with a notice"),
        RunOutcome::Submitted(Outcome::ErrorDetected) => println!("✗ The site reported an error"),
        RunOutcome::Submitted(Outcome::Unknown) => println!("? No visible change after submit"),
        RunOutcome::Handoff => println!("! Submit button not found, manual handoff required"),
    }

    let facility = report
        .facility
        .title
        .clone()
        .unwrap_or_else(|| report.facility.by.to_string());
    println!("  Facility: {}", facility);
    for line in report.snapshot.to_string().lines() {
        println!("  {}", line);
    }
    if report.fill.day.is_fallback() {
        println!("  (preferred day not offered, first open day used)");
    }
    if !report.fill.convergence.is_stable() {
        println!("  (month/room did not settle, check the form)");
    }
    for notice in &report.notices {
        println!("  Notice: {}", notice);
    }
    for message in &report.failure_messages {
        println!("  Error: {}", message);
    }
    if let Some(ref url) = report.url {
        println!("  URL: {}", url);
    }
    println!("  Duration: {}ms", report.duration_ms);
}
