use std::path::{Path, PathBuf};
use std::sync::Arc;

use actisync_core::destination::{DestinationFactory, GoogleCalendarFactory};
use actisync_core::source::{GoogleFitSource, Source, TogglSource};
use actisync_core::{
    EnginePool, EngineSettings, ErrorReporter, PerformanceMonitor, SyncConfig, TimeWindow,
};
use anyhow::{Context, Result};
use chrono::Utc;
use owo_colors::OwoColorize;

use crate::SourceKind;
use crate::render::{Render, render_calendar, render_window};
use crate::utils::tui;

pub struct SyncOptions {
    pub dry_run: bool,
    pub days: Option<i64>,
    pub only: Option<SourceKind>,
    pub report: Option<PathBuf>,
}

/// Run every enabled source against the configured calendars.
///
/// Returns false when any error was recorded during the run.
pub async fn run(config_path: &Path, options: SyncOptions) -> Result<bool> {
    if !config_path.exists() {
        SyncConfig::create_default_config(config_path)?;
        anyhow::bail!(
            "No config found, created one at {}\n\n\
            Set calendar_id and your access tokens, then run:\n  \
            actisync sync --dry-run",
            config_path.display()
        );
    }

    let config = load_config(config_path, &options)?;
    let reporter = Arc::new(ErrorReporter::new());

    let factory = GoogleCalendarFactory::new(
        &config.google_calendar.api_base,
        &config.google_calendar.access_token,
    )?;

    let spinner = tui::create_spinner(render_calendar(&config.calendar_id));
    let pool = EnginePool::open(
        factory,
        &config.calendar_id,
        EngineSettings::from(&config),
        reporter.clone(),
    )
    .await;
    spinner.finish_and_clear();
    let mut pool =
        pool.with_context(|| format!("Could not open calendar {}", config.calendar_id))?;

    let window = config.sync_window(Utc::now());

    if config.dry_run {
        println!("{}", "Dry run: nothing will be written".yellow());
    }
    println!("{} {}\n", "Syncing".bold(), render_window(&window, config.timezone));

    let mut monitor = PerformanceMonitor::new();

    if config.toggl.enabled {
        let mut toggl = TogglSource::new(config.toggl.clone());
        run_source(&mut monitor, &mut toggl, &mut pool, window).await;
    }

    if config.google_fit.enabled {
        let mut fit = GoogleFitSource::new(
            config.google_fit.clone(),
            config.fit_access_token(),
            config.timezone,
        );
        run_source(&mut monitor, &mut fit, &mut pool, window).await;
    }

    println!();
    for (id, stats) in pool.stats() {
        println!("{}", render_calendar(&id));
        println!("   {}", stats.render());
    }
    println!("\n{}", pool.flush_totals().render());
    println!("\n{}", monitor.render());

    let report = reporter.render();
    if let Some(path) = &options.report {
        std::fs::write(path, &report)
            .with_context(|| format!("Could not write report to {}", path.display()))?;
    }

    if reporter.has_errors() {
        eprintln!("\n{}", report.red());
        return Ok(false);
    }

    Ok(true)
}

/// Load and validate the config, with command-line overrides applied.
fn load_config(config_path: &Path, options: &SyncOptions) -> Result<SyncConfig> {
    let mut config = SyncConfig::load(config_path)?;

    if options.dry_run {
        config.dry_run = true;
    }
    if let Some(days) = options.days {
        config.days_to_sync = days;
    }
    match options.only {
        Some(SourceKind::Toggl) => config.google_fit.enabled = false,
        Some(SourceKind::GoogleFit) => config.toggl.enabled = false,
        None => {}
    }

    config.validate()?;
    tracing::debug!(
        path = %config_path.display(),
        calendar = %config.calendar_id,
        days = config.days_to_sync,
        "Loaded config"
    );
    Ok(config)
}

async fn run_source<S: Source, F: DestinationFactory>(
    monitor: &mut PerformanceMonitor,
    source: &mut S,
    pool: &mut EnginePool<F>,
    window: TimeWindow,
) {
    let spinner = tui::create_spinner(format!("Syncing {}", source.name()));
    let metrics = monitor.track(source, pool, window).await;
    spinner.finish_and_clear();

    println!("{}", metrics.render());
}
