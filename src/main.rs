//! ServerCheck CLI - Hardware Acceptance Testing
//!
//! Validates installed hardware against a declared expectation model and
//! write-tests the target storage devices.

use anyhow::Context;
use clap::Parser;
use servercheck::config::{CliArgs, Commands, Expectations};
use servercheck::core::{RunOptions, ValidationEngine};
use servercheck::error::ServerCheckError;
use servercheck::exec::SystemRunner;
use servercheck::facts::Category;
use servercheck::mount::{MountManager, MountState};
use servercheck::report;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();

    match run(args) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(args: CliArgs) -> anyhow::Result<i32> {
    let config = Expectations::load(&args.config)
        .with_context(|| format!("loading expectations from '{}'", args.config.display()))?;

    let timeout = args
        .tool_timeout_secs
        .unwrap_or(config.exec.tool_timeout_secs);
    let runner = SystemRunner::new(Duration::from_secs(timeout));

    match args.command.clone().unwrap_or(Commands::Check {
        only: Vec::new(),
        no_write_test: false,
    }) {
        Commands::Check {
            only,
            no_write_test,
        } => cmd_check(&args, &config, &runner, &only, no_write_test),
        Commands::Mount => cmd_mount(&config, &runner),
        Commands::Unmount => cmd_unmount(&config, &runner),
        Commands::Status => cmd_status(&config, &runner),
    }
}

fn cmd_check(
    args: &CliArgs,
    config: &Expectations,
    runner: &SystemRunner,
    only: &[String],
    no_write_test: bool,
) -> anyhow::Result<i32> {
    let mut categories = Vec::new();
    for name in only {
        let category = Category::parse(name)
            .ok_or_else(|| anyhow::anyhow!("unknown category '{}'", name))?;
        categories.push(category);
    }

    let options = RunOptions {
        only: categories,
        skip_write_test: no_write_test,
    };
    let engine = ValidationEngine::new(config, runner);
    let run_report = engine.execute(&options);

    if !args.quiet {
        println!("{}", report::render_text(&run_report));
    }

    Ok(if run_report.is_success() { 0 } else { 1 })
}

fn mount_manager<'a>(
    config: &'a Expectations,
    runner: &'a SystemRunner,
) -> anyhow::Result<MountManager<'a>> {
    let target_model = config
        .disk
        .target_model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("disk.target_model is not configured"))?;
    Ok(MountManager::new(
        runner,
        config.mounts.base_dir.clone(),
        target_model,
    ))
}

fn cmd_mount(config: &Expectations, runner: &SystemRunner) -> anyhow::Result<i32> {
    let manager = mount_manager(config, runner)?;
    let devices = manager.mount_all().map_err(fatal_mount_error)?;

    let mut exit_code = 0;
    for device in &devices {
        match &device.state {
            MountState::Mounted { path } => {
                println!("{} mounted at {}", device.path, path.display());
            }
            MountState::MountFailed { reason } => {
                eprintln!("{} mount failed: {}", device.path, reason);
                exit_code = 1;
            }
            MountState::Unmounted => {
                eprintln!("{} unexpectedly unmounted", device.path);
                exit_code = 1;
            }
        }
    }
    Ok(exit_code)
}

fn cmd_unmount(config: &Expectations, runner: &SystemRunner) -> anyhow::Result<i32> {
    let manager = mount_manager(config, runner)?;
    let devices = manager.unmount_all().map_err(fatal_mount_error)?;
    for device in &devices {
        println!("{} unmounted", device.path);
    }
    Ok(0)
}

fn cmd_status(config: &Expectations, runner: &SystemRunner) -> anyhow::Result<i32> {
    let manager = mount_manager(config, runner)?;
    let devices = manager.status().map_err(fatal_mount_error)?;
    for device in &devices {
        let state = match &device.state {
            MountState::Mounted { path } => format!("mounted at {}", path.display()),
            MountState::Unmounted => "unmounted".to_string(),
            MountState::MountFailed { reason } => format!("mount failed: {}", reason),
        };
        let filesystem = device.filesystem.as_deref().unwrap_or("no filesystem");
        println!(
            "{}  {}  {:.2} GB  {}  {}",
            device.path,
            device.model,
            device.capacity_bytes / 1e9,
            filesystem,
            state
        );
    }
    Ok(0)
}

fn fatal_mount_error(e: ServerCheckError) -> anyhow::Error {
    anyhow::Error::new(e)
}
