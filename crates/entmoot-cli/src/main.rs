//! `entmoot`: run JSON-encoded programs on the entmoot runtime.

mod repl;
mod resolver;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use entmoot::ast;
use entmoot::{exit_code, Config, EvalError, GcConfig, ProcessContext};
use resolver::{read_module, SearchPath};

/// Exit status for failures of the host itself (unreadable script,
/// malformed JSON).
const HOST_FAILURE: u8 = 2;

/// Exit status for a panic or an interpreter fault.
const FATAL: u8 = 254;

/// Entmoot - run programs on a continuation-driven dynamic runtime
#[derive(Parser, Debug)]
#[command(name = "entmoot", version)]
#[command(about = "Run JSON-encoded syntax trees", long_about = None)]
struct Args {
    /// Program passed in as a JSON `Module`
    #[arg(short = 'c', value_name = "JSON", conflicts_with_all = ["module", "script"])]
    command: Option<String>,

    /// Run a module from the search path as `__main__`
    #[arg(short = 'm', value_name = "NAME", conflicts_with = "script")]
    module: Option<String>,

    /// Enter the interactive loop after running the program
    #[arg(short = 'i')]
    interactive: bool,

    /// Module search directory (repeatable)
    #[arg(short = 'p', long = "path", value_name = "DIR", env = "ENTMOOT_PATH", value_delimiter = ':')]
    path: Vec<PathBuf>,

    /// Skip `assert` statements
    #[arg(short = 'O')]
    optimize: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Maximum number of active frames
    #[arg(long, default_value_t = 1000)]
    max_frames: usize,

    /// Do not run the background collector
    #[arg(long)]
    no_gc: bool,

    /// Pause between background collector scans
    #[arg(long, value_name = "MS")]
    gc_interval_ms: Option<u64>,

    /// Script: a file holding a JSON `Module`
    script: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> Config {
        let mut gc = if self.no_gc { GcConfig::manual() } else { GcConfig::default() };
        if let Some(ms) = self.gc_interval_ms {
            gc.scan_interval = Duration::from_millis(ms);
        }
        Config::new()
            .with_optimize(self.optimize)
            .with_max_frames(self.max_frames)
            .with_gc(gc)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let code = match panic::catch_unwind(AssertUnwindSafe(|| run(&args))) {
        Ok(Ok(code)) => code,
        Ok(Err(error)) => {
            eprintln!("entmoot: {:#}", error);
            HOST_FAILURE
        }
        Err(_) => FATAL,
    };
    ExitCode::from(code)
}

static TRACING: Once = Once::new();

fn init_tracing(verbose: bool) {
    TRACING.call_once(|| {
        let default = if verbose { "debug" } else { "warn" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    });
}

fn run(args: &Args) -> Result<u8> {
    let search = SearchPath::new(args.path.clone());
    let process = ProcessContext::with_resolver(args.config(), search.clone());
    watch_interrupts(process.interrupt_handle());
    let mut thread = process.thread();

    let program = if let Some(source) = &args.command {
        Some(serde_json::from_str::<ast::Module>(source).context("-c: invalid module JSON")?)
    } else if let Some(name) = &args.module {
        let location = search
            .locate(name)
            .ok_or_else(|| anyhow!("No module named {}", name))?;
        Some(read_module(name, location.path())?)
    } else if let Some(script) = &args.script {
        let source = std::fs::read_to_string(script)
            .with_context(|| format!("can't open file '{}'", script.display()))?;
        let module = serde_json::from_str::<ast::Module>(&source)
            .with_context(|| format!("{}: invalid module JSON", script.display()))?;
        Some(module)
    } else {
        None
    };

    let mut code = 0;
    if let Some(module) = &program {
        let outcome = thread.evaluate_module(module);
        match &outcome {
            Ok(_) => {}
            Err(EvalError::Exception(exception)) => eprint!("{}", exception.report()),
            Err(error) => eprintln!("entmoot: {}", error),
        }
        code = exit_code(&outcome);
        tracing::debug!(code, "program finished");
    }

    if args.interactive || program.is_none() {
        repl::run(&mut thread)?;
    }
    Ok(u8::try_from(code).unwrap_or(FATAL))
}

/// Route Ctrl-C to the process interrupt flag from a helper thread.
fn watch_interrupts(flag: Arc<AtomicBool>) {
    let spawned = thread::Builder::new()
        .name("entmoot-signals".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(error) => {
                    tracing::warn!(%error, "cannot start the signal runtime");
                    return;
                }
            };
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    tracing::debug!("interrupt requested");
                    flag.store(true, Ordering::Release);
                }
            });
        });
    if let Err(error) = spawned {
        tracing::warn!(%error, "cannot watch for interrupts");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args_map_onto_config() {
        let args = Args::parse_from([
            "entmoot",
            "-O",
            "--max-frames",
            "64",
            "--no-gc",
            "--gc-interval-ms",
            "5",
            "prog.json",
        ]);
        let config = args.config();
        assert!(config.optimize);
        assert_eq!(config.max_frames, 64);
        assert!(!config.gc.background);
        assert_eq!(config.gc.scan_interval, Duration::from_millis(5));
        assert_eq!(args.script, Some(PathBuf::from("prog.json")));
    }

    #[test]
    fn test_command_conflicts_with_script() {
        let parsed = Args::try_parse_from(["entmoot", "-c", "{}", "prog.json"]);
        assert!(parsed.is_err());
    }
}
