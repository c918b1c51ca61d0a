// Declare modules
pub mod cli;
pub mod composer;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notifier;
pub mod scheduler;
pub mod storage;
pub mod transform;
pub mod watcher;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use self::cli::Cli;
use self::config::{load_settings, resolve_config_path};
use self::engine::Engine;
use self::models::Settings;
use self::notifier::LogNotifier;
use self::watcher::ComboWatcher;

/// Initializes components and orchestrates data flow.
pub fn run() -> Result<()> {
    // 1. Parse Args
    let args = Cli::parse();

    // 2. Logging
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    // 3. Resolve Configuration
    let config_path = resolve_config_path(args.config.as_deref())?;
    let settings = load_settings(&config_path)?;

    if args.check {
        print_summary(&settings);
        return Ok(());
    }

    if settings.combos.is_empty() {
        log::warn!(
            "💡 Tip: no [[combo]] entries in {}, nothing to do.",
            config_path.display()
        );
    }

    // 4. Initial combine of every output
    let engine = Engine::with_disk(settings, Arc::new(LogNotifier))
        .context("Failed to start combination engine")?;
    if args.once {
        // Wait out busy inputs instead of leaving retries on the timer thread
        engine.combine_all_blocking();
        engine.shutdown();
        return Ok(());
    }
    engine.trigger_all();

    // 5. Watch until asked to stop
    let watcher = ComboWatcher::bind(&engine).context("Failed to set up file watching")?;

    log::info!("combotext is running. Press Ctrl+C to exit.");
    wait_for_termination()?;

    log::info!("Shutting down...");
    drop(watcher);
    engine.shutdown();
    Ok(())
}

#[cfg(unix)]
fn wait_for_termination() -> Result<()> {
    use signal_hook::consts::TERM_SIGNALS;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new(TERM_SIGNALS).context("Failed to register signal handler")?;
    if let Some(signal) = signals.forever().next() {
        log::debug!("received signal {signal}");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_termination() -> Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    let term = Arc::new(AtomicBool::new(false));
    for signal in signal_hook::consts::TERM_SIGNALS {
        signal_hook::flag::register(*signal, Arc::clone(&term))
            .context("Failed to register signal handler")?;
    }
    while !term.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }
    Ok(())
}

fn print_summary(settings: &Settings) {
    println!(
        "retry delay: {}ms, lock scope: {:?}",
        settings.engine.retry_delay_ms, settings.engine.lock_scope
    );
    for combo in &settings.combos {
        println!("{}", combo.output_file.display());
        for input in &combo.input_files {
            let marker = if input.skip_if_empty { " (skip if empty)" } else { "" };
            println!("    {}{}", input.path.display(), marker);
        }
    }
}
