use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use tessel_bytecode::{ModuleDescription, ProcId};
use tessel_vm::samples::{self, run_factorial, run_sort};
use tessel_vm::{disassemble, Module, ModuleBuilder, Registry, RuntimeConfig, VmError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod report;

/// Tessel - register VM with verified scope discipline
#[derive(Parser)]
#[command(name = "tessel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, inspect and run Tessel VM modules", long_about = "Tessel VM Toolkit\n\nModules are given either as the name of a built-in sample\n(factorial, quicksort) or as a JSON module description:\n  - Run the sample programs\n  - Verify, inspect and disassemble modules\n  - Export samples as JSON and run exported modules")]
#[command(author = "Tessel Team")]
struct Cli {
    /// Log builder and lifecycle events
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Maximum nesting of procedure calls
    #[arg(long, global = true, value_name = "DEPTH")]
    max_call_depth: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute n! with the factorial sample
    Factorial {
        /// Input value
        n: i64,
    },
    /// Sort words with the quicksort sample
    Sort {
        /// Values to sort
        #[arg(allow_negative_numbers = true, required = true)]
        values: Vec<i64>,
    },
    /// Verify a module without registering it
    Check {
        /// Sample name or JSON module file
        target: String,
    },
    /// Show module statistics
    Inspect {
        /// Sample name or JSON module file
        target: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Disassemble a module
    Disassemble {
        /// Sample name or JSON module file
        target: String,
    },
    /// Write a sample module as JSON
    Export {
        /// Sample name
        sample: String,
        /// Output file
        file: String,
    },
    /// Run a procedure of a JSON module file
    Run {
        /// JSON module file
        file: String,
        /// Procedure to call
        #[arg(long, default_value_t = 0)]
        proc: u32,
        /// Words stored into the io variable, one per element
        #[arg(long = "word", allow_negative_numbers = true)]
        words: Vec<i64>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = RuntimeConfig {
        max_call_depth: cli
            .max_call_depth
            .unwrap_or(RuntimeConfig::default().max_call_depth),
    };
    let registry = Registry::with_config(config);

    let result = match cli.command {
        Commands::Factorial { n } => factorial_command(&registry, n),
        Commands::Sort { values } => sort_command(&registry, &values),
        Commands::Check { target } => check_command(&registry, &target),
        Commands::Inspect { target, json } => inspect_command(&registry, &target, json),
        Commands::Disassemble { target } => disassemble_command(&registry, &target),
        Commands::Export { sample, file } => export_command(&registry, &sample, &file),
        Commands::Run { file, proc, words } => {
            run_command(&registry, &file, ProcId(proc), &words)
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn sample_description(
    registry: &Registry,
    name: &str,
) -> Option<tessel_vm::error::Result<ModuleDescription>> {
    match name {
        "factorial" => Some(samples::factorial_description(registry)),
        "quicksort" | "sort" => Some(samples::quicksort_description(registry)),
        _ => None,
    }
}

/// Resolve a sample name or a JSON file to a verified description
fn load(registry: &Registry, target: &str) -> Result<ModuleDescription> {
    if let Some(desc) = sample_description(registry, target) {
        return Ok(desc?);
    }
    let desc = read_description(target)?;
    let mut builder = ModuleBuilder::from_description(registry, &desc)
        .with_context(|| format!("module '{}' is invalid", target))?;
    let verified = builder
        .finish()
        .with_context(|| format!("module '{}' failed verification", target))?;
    Ok(verified)
}

fn read_description(file: &str) -> Result<ModuleDescription> {
    let contents =
        fs::read_to_string(file).with_context(|| format!("Error reading file '{}'", file))?;
    let desc = serde_json::from_str(&contents)
        .with_context(|| format!("'{}' is not a module description", file))?;
    Ok(desc)
}

fn factorial_command(registry: &Registry, n: i64) -> Result<()> {
    let module = Module::new(registry, samples::factorial(registry)?);
    println!("{}", run_factorial(&module, n)?);
    Ok(())
}

fn sort_command(registry: &Registry, values: &[i64]) -> Result<()> {
    let module = Module::new(registry, samples::quicksort(registry)?);
    let sorted = run_sort(&module, values)?;
    let text: Vec<String> = sorted.iter().map(|v| v.to_string()).collect();
    println!("{}", text.join(" "));
    Ok(())
}

fn check_command(registry: &Registry, target: &str) -> Result<()> {
    let desc = load(registry, target)?;
    println!("✓ Verification OK");
    println!(
        "\n'{}' declares {} procedures over {} registers",
        target,
        desc.procs.len(),
        desc.regs.len()
    );
    Ok(())
}

fn inspect_command(registry: &Registry, target: &str, json_output: bool) -> Result<()> {
    let desc = load(registry, target)?;
    let summary = report::summarize(&desc);
    if json_output {
        let json = serde_json::to_string_pretty(&summary).context("Error serializing JSON")?;
        println!("{}", json);
    } else {
        report::print(&summary);
    }
    Ok(())
}

fn disassemble_command(registry: &Registry, target: &str) -> Result<()> {
    let desc = load(registry, target)?;
    println!("Disassembly of '{}':", target);
    println!();
    print!("{}", disassemble(&desc));
    Ok(())
}

fn export_command(registry: &Registry, sample: &str, file: &str) -> Result<()> {
    let Some(desc) = sample_description(registry, sample) else {
        bail!("unknown sample '{}' (expected factorial or quicksort)", sample);
    };
    let json = serde_json::to_string_pretty(&desc?).context("Error serializing JSON")?;
    fs::write(file, json).with_context(|| format!("Error writing file '{}'", file))?;
    println!("Wrote {} to '{}'", sample, file);
    Ok(())
}

fn run_command(registry: &Registry, file: &str, proc: ProcId, words: &[i64]) -> Result<()> {
    let desc = read_description(file)?;
    let mut builder = ModuleBuilder::from_description(registry, &desc)
        .with_context(|| format!("module '{}' is invalid", file))?;
    let module = Module::new(registry, builder.create_module()?);
    module.unpack()?;

    let def = module.proc_by_id(proc)?;
    let io_reg = module.proc_type_by_id(def.ptype)?.io;
    let spec = module.reg_by_id(io_reg)?;
    let io = module.new_variable(spec.vtype, words.len())?;
    {
        let mut var = io.write();
        for (i, w) in words.iter().enumerate() {
            var.set_word(i, *w)?;
        }
    }
    debug!(module = %module.id(), %proc, io = %io_reg, "running");

    match module.call_proc(proc, &io) {
        Ok(()) => {}
        Err(VmError::Execution(fault)) => bail!("{} (code {})", fault, fault.code()),
        Err(err) => return Err(err.into()),
    }
    let out: Vec<String> = io.read().words().iter().map(|v| v.to_string()).collect();
    println!("{}", out.join(" "));
    Ok(())
}
