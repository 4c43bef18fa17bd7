
use log::{LevelFilter, error, info, warn};
use rust_lib_reference_genome::reference_genome::ReferenceGenome;
use serde::Serialize;
use std::time::Instant;

use quorum::cli::core::{Commands, get_cli};
use quorum::cli::paired::{PairedSettings, check_paired_settings};
use quorum::cli::shared::SharedSettings;
use quorum::cli::single::{SingleSettings, check_single_settings};
use quorum::parsing::contig_index::{ContigIndex, fai_path};
use quorum::pipeline::{RunConfig, failure_exit_code, run_pipeline};
use quorum::util::json_io::save_json;

/// Sets up logging before any settings are checked
fn init_logging(verbosity: u8) {
    let filter_level: LevelFilter = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();
}

/// Builds the run configuration or exits with a configuration error
fn build_run_config(result: anyhow::Result<RunConfig>) -> RunConfig {
    match result {
        Ok(rc) => rc,
        Err(e) => {
            error!("Error while building run configuration: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    }
}

/// Shared body of both subcommands once the settings are checked
fn run_quorum<S: Serialize>(settings: &S, shared: &SharedSettings, run_config: RunConfig) {
    // start the timer
    let start_time = Instant::now();

    // create the primary output folder
    info!("Creating output folder at {:?}...", shared.output_folder);
    match std::fs::create_dir_all(&shared.output_folder) {
        Ok(()) => {},
        Err(e) => {
            error!("Error while creating output folder: {e}");
            std::process::exit(exitcode::IOERR);
        }
    }

    // create a debug folder if specified
    if let Some(debug_folder) = shared.debug_folder.as_ref() {
        info!("Creating debug folder at {debug_folder:?}...");
        match std::fs::create_dir_all(debug_folder) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while creating debug folder: {e}");
                std::process::exit(exitcode::IOERR);
            }
        }

        // save the CLI options
        let cli_json = debug_folder.join("cli_settings.json");
        info!("Saving CLI options to {cli_json:?}...");
        if let Err(e) = save_json(settings, &cli_json) {
            error!("Error while saving CLI options: {e}");
            std::process::exit(exitcode::IOERR);
        }
        warn!("Debug run detected, intermediate files will be kept.");
    }

    // load the reference genome and its contig order
    info!("Pre-loading reference genome into memory...");
    let reference_genome = match ReferenceGenome::from_fasta(&shared.reference_fn) {
        Ok(rg) => rg,
        Err(e) => {
            error!("Error while loading reference genome: {e:?}");
            std::process::exit(exitcode::IOERR);
        }
    };
    let contig_index = match ContigIndex::from_fai(&fai_path(&shared.reference_fn)) {
        Ok(ci) => ci,
        Err(e) => {
            error!("Error while loading reference index: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    let outcomes = match run_pipeline(&run_config, &reference_genome, &contig_index) {
        Ok(o) => o,
        Err(e) => {
            error!("Error while running pipeline: {e:#}");
            std::process::exit(failure_exit_code(&e));
        }
    };

    for outcome in outcomes.iter() {
        info!("{}: {} calls ({} PASS) in {:?}", outcome.class.designator(), outcome.num_calls, outcome.num_pass, outcome.calls_fn);
        if let Some(model_fn) = outcome.model_fn.as_ref() {
            info!("\tTrained model: {model_fn:?}");
        }
    }
    info!("Adjudication completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn run_paired(settings: PairedSettings) {
    init_logging(settings.shared.verbosity);
    let settings = match check_paired_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };
    let run_config = build_run_config(settings.run_config());
    run_quorum(&settings, &settings.shared, run_config);
}

fn run_single(settings: SingleSettings) {
    init_logging(settings.shared.verbosity);
    let settings = match check_single_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };
    let run_config = build_run_config(settings.run_config());
    run_quorum(&settings, &settings.shared, run_config);
}

fn main() {
    let cli = get_cli();
    match cli.command {
        Commands::Paired(settings) => {
            run_paired(*settings);
        },
        Commands::Single(settings) => {
            run_single(*settings);
        }
    }

    info!("Process finished successfully.");
}
