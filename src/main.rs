use anyhow::{Context, Result};
use autofix::config::{resolve, DebuggerConfig, Overrides};
use autofix::controller::{is_affirmative, Controller, IterationState, Phase};
use autofix::diagnosis::ReasoningService;
use autofix::executor::{resolve_interpreter, Executor, ProcessExecutor};
use autofix::{BackupStore, ChatCompletionsClient, PatchEngine};
use clap::Parser;
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autofix")]
#[command(about = "Run a program, diagnose its errors and patch them with confirmation", long_about = None)]
#[command(version)]
struct Cli {
    /// Program to run and repair
    target: PathBuf,

    /// Config file (defaults to ./autofix.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Apply every proposed correction without asking
    #[arg(short, long)]
    yes: bool,

    /// Interpreter command used to run the target
    #[arg(long)]
    interpreter: Option<String>,

    /// Virtualenv interpreter, used when it exists
    #[arg(long)]
    venv: Option<PathBuf>,

    /// Timeout for one run of the target, in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Directory for backups
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Stop after this many run/diagnose cycles
    #[arg(short, long)]
    max_iterations: Option<u32>,

    /// Show unified diff of each proposed patch
    #[arg(short, long)]
    diff: bool,

    /// Copy the session backup back over the target if the session fails
    #[arg(long)]
    restore_on_failure: bool,

    /// Log library activity to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// How a session ended, from the caller's side.
enum Outcome {
    Finished(Phase),
    IterationLimit(u32),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides; --verbose => info; else warn
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "autofix=info" } else { "warn" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = resolve_config(&cli)?;
    let interpreter = resolve_interpreter(config.venv_interpreter.as_deref(), &config.interpreter);
    let executor = ProcessExecutor::new(&interpreter, Duration::from_secs(config.timeout_secs))
        .context("failed to start the process runtime")?;
    let service = ChatCompletionsClient::from_config(&config.service)
        .context("failed to set up the reasoning service")?;
    let engine = PatchEngine::new(BackupStore::new(&config.backup_dir));

    println!("{} {}", "Interpreter:".bold(), interpreter.display());
    println!("{} {}", "Model:".bold(), service.model());

    let mut controller = Controller::new(&cli.target, engine, executor, service);
    let outcome = run_session(&mut controller, &config, &cli)?;

    let failed = match outcome {
        Outcome::Finished(Phase::Succeeded) => false,
        Outcome::Finished(_) | Outcome::IterationLimit(_) => true,
    };
    if failed && cli.restore_on_failure {
        restore_session_backup(&controller)?;
    }

    print_summary(controller.state(), &outcome);

    if failed {
        std::process::exit(1);
    }

    Ok(())
}

/// Config file (or defaults) with command-line overrides applied.
fn resolve_config(cli: &Cli) -> Result<DebuggerConfig> {
    let cwd = env::current_dir().context("failed to read the working directory")?;
    let overrides = Overrides {
        interpreter: cli.interpreter.clone(),
        venv_interpreter: cli.venv.clone(),
        timeout_secs: cli.timeout,
        backup_dir: cli.backup_dir.clone(),
        max_iterations: cli.max_iterations,
        auto_confirm: cli.yes,
    };
    Ok(resolve(cli.config.as_deref(), &cwd, &overrides)?)
}

fn run_session<E: Executor, R: ReasoningService>(
    controller: &mut Controller<E, R>,
    config: &DebuggerConfig,
    cli: &Cli,
) -> Result<Outcome> {
    controller.start()?;
    print_log(controller.take_log());

    while !controller.phase().is_terminal() {
        match controller.phase() {
            Phase::Running => {
                if let Some(max) = config.max_iterations {
                    if controller.state().iteration_count >= max {
                        return Ok(Outcome::IterationLimit(max));
                    }
                }
                println!();
                controller.step()?;
                print_log(controller.take_log());
            }
            Phase::AwaitingConfirmation => {
                print_proposal(controller.state());
                if cli.diff {
                    show_staged_diff(controller)?;
                }

                let accepted = config.auto_confirm || prompt_confirmation()?;
                if accepted {
                    controller.confirm()?;
                } else {
                    controller.cancel()?;
                }
                print_log(controller.take_log());
            }
            Phase::Idle | Phase::Succeeded | Phase::Failed | Phase::Cancelled => break,
        }
    }

    Ok(Outcome::Finished(controller.phase()))
}

fn print_log(lines: Vec<String>) {
    for line in lines {
        if line.starts_with("Iteration ") {
            println!("{}", line.bold());
        } else if line.starts_with("Error output:") {
            println!("{}", line.red());
        } else if line.starts_with("Failed") {
            println!("{} {}", "✗".red(), line);
        } else if line.starts_with("Target ran without errors") {
            println!("{} {}", "✓".green(), line);
        } else {
            println!("{}", line.dimmed());
        }
    }
}

fn print_proposal(state: &IterationState) {
    let Some(diagnosis) = &state.last_diagnosis else {
        return;
    };

    println!();
    println!("{}", "Diagnosis:".bold());
    if let Some(kind) = &diagnosis.type_erreur {
        println!("  Error type: {}", kind.yellow());
    }
    if let Some(cause) = &diagnosis.cause {
        println!("  Cause: {cause}");
    }

    println!("{}", "Proposed corrections:".bold());
    for correction in state.pending_corrections() {
        println!("  {} line {}", "•".cyan(), correction.line);
        if let Some(original) = &correction.original {
            println!("    {}", format!("- {original}").red());
        }
        println!("    {}", format!("+ {}", correction.replacement).green());
        if let Some(explanation) = &correction.explanation {
            println!("    {}", explanation.dimmed());
        }
    }

    if let Some(advice) = &diagnosis.conseil {
        println!("  Advice: {}", advice.cyan());
    }
}

fn show_staged_diff<E: Executor, R: ReasoningService>(controller: &Controller<E, R>) -> Result<()> {
    let Some(batch) = &controller.state().pending_batch else {
        return Ok(());
    };
    let target = controller.target();
    let before = fs::read_to_string(target)
        .with_context(|| format!("failed to read {}", target.display()))?;
    let after = controller.engine().preview(target, batch)?;
    if before != after {
        display_diff(target, &before, &after);
    }
    Ok(())
}

fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (current)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (proposed)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

/// Ask on stdin; end of input counts as "no".
fn prompt_confirmation() -> Result<bool> {
    print!("\n{} ", "Apply these corrections? (yes/no)".bold());
    io::stdout().flush()?;

    let mut answer = String::new();
    let read = io::stdin().lock().read_line(&mut answer)?;
    Ok(read > 0 && is_affirmative(&answer))
}

fn restore_session_backup<E: Executor, R: ReasoningService>(
    controller: &Controller<E, R>,
) -> Result<()> {
    let Some(record) = &controller.state().initial_backup else {
        return Ok(());
    };
    controller.engine().restore(record, controller.target())?;
    println!(
        "{} restored {} from {}",
        "↺".yellow(),
        controller.target().display(),
        record.path.display()
    );
    Ok(())
}

fn print_summary(state: &IterationState, outcome: &Outcome) {
    println!();
    println!("{}", "Summary:".bold());
    match outcome {
        Outcome::Finished(phase) => {
            let status = match phase {
                Phase::Succeeded => phase.to_string().green(),
                Phase::Cancelled => phase.to_string().yellow(),
                _ => phase.to_string().red(),
            };
            println!("  status: {status}");
        }
        Outcome::IterationLimit(max) => {
            println!("  status: {}", format!("stopped after {max} iteration(s)").red());
        }
    }
    println!("  {} iteration(s)", state.iteration_count);
    println!(
        "  {} correction(s) applied",
        format!("{}", state.applied_correction_count).green()
    );
    if let Some(record) = &state.initial_backup {
        println!("  backup: {}", record.path.display());
    }
}
