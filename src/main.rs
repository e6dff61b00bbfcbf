//! cppstats-prepare - command-line entry point.
//!
//! # Execution Flow
//!
//! 1. Parse arguments and resolve the mode; `--list-kinds` prints the kind table
//!    and exits, usage errors exit before any file is written
//! 2. Load `.cppstats/cppstats-prepare.yaml`, apply `CPPSTATS_*` variables and flags
//! 3. Initialize logging → `<log_dir>/cppstats-prepare.<date>`
//! 4. Create a current-thread tokio runtime for the external tools
//! 5. Run the requested preparations, one project at a time
//!
//! # Exit status
//!
//! - `0`: every run finished (individual files may still have failed)
//! - `70`: a tool was killed by a signal, or too many tools failed
//! - `1`: usage errors and anything else

use anyhow::{Context, Result};
use clap::Parser;
use cppstats_prepare::cli::{self, Cli, Mode};
use cppstats_prepare::services::{ProcessRunner, Toolchain, projects};
use cppstats_prepare::{APP_NAME, ConfigManager, PrepareError, PrepareSettings, Preparer, VERSION};

fn main() {
    std::process::exit(real_main());
}

fn real_main() -> i32 {
    let cli = Cli::parse();

    // Usage errors are reported before anything is created on disk.
    let mode = match cli.mode() {
        Ok(Mode::ListKinds) => {
            print!("{}", cli::kind_table());
            return 0;
        }
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_code();
        }
    };

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e:#}");
            return 1;
        }
    };

    // Held until real_main returns so buffered log lines are flushed.
    let _guard = match cppstats_prepare::logging::setup_logging_with_console(
        &settings.log_dir,
        APP_NAME,
        settings.debug_mode,
        !cli.no_console,
    ) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: failed to initialize logging: {e:#}");
            return 1;
        }
    };

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    match run(&cli, mode, &settings) {
        Ok(()) => 0,
        Err(e) => {
            let code = e
                .downcast_ref::<PrepareError>()
                .map_or(1, PrepareError::exit_code);
            tracing::error!("{:#}", e);
            if cli.no_console {
                eprintln!("error: {e:#}");
            }
            code
        }
    }
}

fn load_settings(cli: &Cli) -> Result<PrepareSettings> {
    let manager = ConfigManager::new(&cli.config_dir)?;
    let mut settings = manager.load_settings()?;
    cli.apply_overrides(&mut settings);
    Ok(settings)
}

fn run(cli: &Cli, mode: Mode, settings: &PrepareSettings) -> Result<()> {
    // Steps run strictly one after another; one thread is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let toolchain =
        Toolchain::new(settings.tools.clone()).context("Failed to prepare external tools")?;
    let runner = ProcessRunner::new(settings.tool_timeout());
    let preparer = Preparer::new(cli.run_options(settings), toolchain, runner);
    let kind = cli.kind();

    runtime.block_on(async {
        match mode {
            Mode::ListKinds => {
                print!("{}", cli::kind_table());
            }
            Mode::File { input, output } => {
                projects::apply_file(&preparer, kind, &input, &output).await?;
            }
            Mode::List { path, all_kinds } => {
                let folders = projects::read_input_list(&path)
                    .with_context(|| format!("Failed to read input list: {}", path))?;
                tracing::info!("{} projects listed in {}", folders.len(), path);

                if all_kinds {
                    projects::apply_all_kinds(&preparer, &folders).await?;
                } else {
                    projects::apply_folders(&preparer, kind, &folders).await?;
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
