use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result};
use clap::Parser;
use doctrace::cli::Cli;
use doctrace::config::DoctraceConfig;
use doctrace::demos::DemoOutcome;
use doctrace::export::{self, ExportContext};
use doctrace::filter::call_filter_factory;
use doctrace::json_output;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_outcome(outcome: &DemoOutcome) {
    match (&outcome.value, &outcome.error) {
        (_, Some(error)) => println!("error: {}: {}", error.class_name, error.message),
        (Some(value), None) => println!("result: {}", value),
        (None, None) => println!("result: ()"),
    }
}

/// Render a recorded event log instead of tracing a demo
fn run_replay(args: &Cli, config: &DoctraceConfig) -> Result<i32> {
    let Some(events_path) = &args.replay else {
        return Ok(0);
    };
    let reader = BufReader::new(
        File::open(events_path)
            .with_context(|| format!("Failed to open event log {}", events_path.display()))?,
    );
    let document = json_output::read_event_log(reader)
        .with_context(|| format!("Invalid event log {}", events_path.display()))?;

    let format = args.format(config);
    let path = export::replay_to_file(&document, format, &args.path_template(config, format))?;
    println!("diagram written to {}", path.display());
    Ok(0)
}

/// Trace the selected demo into a diagram; exit code 1 when it ends in error
fn run_demo(args: &Cli, config: &DoctraceConfig) -> Result<i32> {
    let prepared = args.demo.prepare(args.demo_arg())?;
    let call_filter = call_filter_factory(Some(args.presets(config)?));

    let format = args.format(config);
    let (start_module, start_function) = prepared.entry_point();
    let context = ExportContext::new(
        format,
        &args.path_template(config, format),
        start_module,
        start_function,
        call_filter,
    );

    let run = export::trace_to_file(&context, || prepared.run())
        .with_context(|| format!("Failed to export diagram to {}", context.export_file_path))?;

    print_outcome(&run.outcome);
    match &run.export_error {
        Some(error) => eprintln!("diagram export to {} failed: {}", run.output.display(), error),
        None => println!("diagram written to {}", run.output.display()),
    }

    Ok(i32::from(run.outcome.is_error()))
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let config = args.load_config().context("Failed to load configuration")?;
    let code = if args.replay.is_some() {
        run_replay(&args, &config)?
    } else {
        run_demo(&args, &config)?
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
