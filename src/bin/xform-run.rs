//! CLI tool to run pipeline (.pipe) files against integer input.

use clap::Parser;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use xform_rs::{CompileOptions, execute_pipeline_with, explain_pipeline};

/// Run a pipeline file against whitespace-separated integers.
///
/// Output is identical with and without push-down.
#[derive(Parser)]
#[command(name = "xform-run")]
struct Cli {
    /// Pipeline definition file (.pipe)
    pipeline: String,

    /// Input data file (integers, or /dev/stdin)
    input: String,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Show paths, options, and element counts on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Print the compiled plan instead of running it
    #[arg(long)]
    explain: bool,

    /// Keep every DROP/TAKE as its own stage
    #[arg(long)]
    no_push_down: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "xform_rs=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let pipeline_text = match fs::read_to_string(&cli.pipeline) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading pipeline file '{}': {e}", cli.pipeline);
            process::exit(1);
        }
    };

    let input_text = match fs::read_to_string(&cli.input) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading input file '{}': {e}", cli.input);
            process::exit(1);
        }
    };

    let options = if cli.no_push_down {
        CompileOptions::without_push_down()
    } else {
        CompileOptions::default()
    };

    if cli.verbose {
        eprintln!("Pipeline: {}", cli.pipeline);
        eprintln!("Input:    {}", cli.input);
        eprintln!("Output:   {}", cli.output.as_deref().unwrap_or("(stdout)"));
        eprintln!("Push-down: {}", if options.push_down { "on" } else { "off" });
    }

    if cli.explain {
        match explain_pipeline(options, &input_text, &pipeline_text) {
            Ok(summary) => println!("{summary}"),
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                process::exit(1);
            }
        }
        return;
    }

    match execute_pipeline_with(options, &input_text, &pipeline_text) {
        Ok((output, input_count, output_count)) => {
            if let Some(out_path) = &cli.output {
                if let Some(parent) = Path::new(out_path.as_str()).parent()
                    && !parent.as_os_str().is_empty()
                    && fs::create_dir_all(parent).is_err()
                {
                    eprintln!("Error creating output directory for '{out_path}'");
                    process::exit(1);
                }
                if let Err(e) = fs::write(out_path, &output) {
                    eprintln!("Error writing output file '{out_path}': {e}");
                    process::exit(1);
                }
            } else {
                if let Err(e) = io::stdout().write_all(output.as_bytes()) {
                    eprintln!("Error writing output: {e}");
                    process::exit(1);
                }
                if !output.is_empty() && !output.ends_with('\n') {
                    println!();
                }
            }
            if cli.verbose {
                eprintln!("Elements: {input_count} in -> {output_count} out");
            }
        }
        Err(e) => {
            eprintln!("Pipeline error: {e}");
            process::exit(1);
        }
    }
}
