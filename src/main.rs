use std::fs;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use typist::clock::SystemClock;
use typist::config::{ConfigUpdate, Preset, TypingConfig};
use typist::dispatch::{parse_command, ChannelDispatcher, Command as ControlCommand, Request, Response};
use typist::engine::Outcome;
use typist::logging::init_logging;
use typist::playback::{countdown, open_sink, resolve_backend, AnySink, SinkBackend};
use typist::{SessionSummary, Typist};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Auto,
    X11,
    Console,
    Sim,
}

impl BackendArg {
    fn to_library(self) -> SinkBackend {
        match self {
            BackendArg::Auto => SinkBackend::Auto,
            BackendArg::X11 => SinkBackend::X11,
            BackendArg::Console => SinkBackend::Console,
            BackendArg::Sim => SinkBackend::Sim,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PresetArg {
    /// ~70 WPM, loose rhythm, frequent small typos.
    HumanSlow,
    /// ~120 WPM, tight rhythm, rare typos.
    HumanFast,
    /// Flat 110 WPM, no typos.
    BotFlat,
}

impl PresetArg {
    fn to_library(self) -> Preset {
        match self {
            PresetArg::HumanSlow => Preset::HumanSlow,
            PresetArg::HumanFast => Preset::HumanFast,
            PresetArg::BotFlat => Preset::BotFlat,
        }
    }
}

#[derive(Debug, Args, Clone)]
struct TypingArgs {
    /// Output backend.
    ///
    /// - auto: X11 when a display is available
    /// - x11: inject keys through XTEST
    /// - console: write to stdout
    /// - sim: type into an in-memory editor and print the result
    #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
    backend: BackendArg,

    /// JSON typing config file (missing fields take defaults)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Apply a preset on top of the config file
    #[arg(long, value_enum)]
    preset: Option<PresetArg>,

    /// Override a setting, e.g. `--set wpm=90 --set nl=keep`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Optional RNG seed (for debugging)
    #[arg(long)]
    seed: Option<u64>,

    /// Countdown seconds before typing starts
    #[arg(long, default_value_t = 5)]
    countdown: u64,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(name = "typist")]
#[command(about = "Replay text into the focused window with human-like timing", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Type one text, then exit. Control lines on stdin (pause, stop, status)
    /// are honoured while typing unless the text itself comes from stdin.
    Run {
        /// Input text file, or '-' for stdin
        #[arg(long, value_name = "PATH")]
        input: PathBuf,

        #[command(flatten)]
        typing: TypingArgs,
    },

    /// Serve control commands from stdin until `quit` or Ctrl+C.
    ///
    /// Commands: start PATH, type TEXT, stop, pause, status, log,
    /// config KEY=VALUE..., preset NAME, quit. Responses are JSON lines on stderr.
    Serve {
        #[command(flatten)]
        typing: TypingArgs,
    },
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == std::ffi::OsStr::new("-")
}

fn read_input(path: &Path) -> Result<String> {
    if is_stdin(path) {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_config(args: &TypingArgs) -> Result<TypingConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: TypingConfig =
                serde_json::from_str(&json).context("failed to parse config JSON")?;
            config.normalized()
        }
        None => TypingConfig::default(),
    };

    if let Some(preset) = args.preset {
        preset.to_library().update().apply_to(&mut config);
    }
    for pair in &args.overrides {
        ConfigUpdate::parse(pair)
            .with_context(|| format!("invalid --set {pair}"))?
            .apply_to(&mut config);
    }

    Ok(config)
}

fn install_interrupt(requests: Sender<Request>, shutdown: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
        let _ = requests.send(Request::Stop);
    })
    .context("failed to install Ctrl+C handler")
}

/// Read control lines from stdin on a background thread.
fn spawn_control_reader(requests: Sender<Request>, shutdown: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Ok(None) => {}
                Ok(Some(ControlCommand::Request(request))) => {
                    if requests.send(request).is_err() {
                        break;
                    }
                }
                Ok(Some(ControlCommand::Quit)) => {
                    shutdown.store(true, Ordering::SeqCst);
                    let _ = requests.send(Request::Stop);
                    break;
                }
                Err(reason) => eprintln!("{}", Response::Rejected(reason).to_json()),
            }
        }
    });
}

type CliTypist = Typist<AnySink, ChannelDispatcher<io::Stderr>, SystemClock>;

fn build_typist(
    args: &TypingArgs,
    requests: mpsc::Receiver<Request>,
    shutdown: &AtomicBool,
) -> Result<CliTypist> {
    let config = load_config(args)?;

    countdown(shutdown, args.countdown)?;
    let sink = open_sink(args.backend.to_library())?;

    let typist = Typist::new(
        sink,
        ChannelDispatcher::new(requests, io::stderr()),
        SystemClock::new(),
    )
    .with_config(config);

    Ok(match args.seed {
        Some(seed) => typist.with_seed(seed),
        None => typist,
    })
}

fn print_summary(summary: &SessionSummary) {
    eprintln!(
        "Typed {}/{} chars, {} mistakes, {} backspaces, {:.1}s active ({:.1}s paused)",
        summary.emitted,
        summary.total,
        summary.mistakes,
        summary.backspaces,
        summary.active_ms as f64 / 1000.0,
        summary.paused_ms as f64 / 1000.0,
    );
}

fn print_simulated_text(typist: &CliTypist) {
    if let AnySink::Sim(editor) = typist.sink() {
        println!("{}", editor.text());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { input, typing } => {
            init_logging(cli.verbose.saturating_add(1), typing.log_file.as_deref())?;
            // Fail fast on unsupported environments/backends.
            resolve_backend(typing.backend.to_library())?;

            let text = read_input(&input)?;

            let (requests_tx, requests_rx) = mpsc::channel();
            let shutdown = Arc::new(AtomicBool::new(false));
            install_interrupt(requests_tx.clone(), shutdown.clone())?;
            if !is_stdin(&input) {
                spawn_control_reader(requests_tx.clone(), shutdown.clone());
            }

            let mut typist = build_typist(&typing, requests_rx, &shutdown)?;
            let summary = typist
                .type_text(&text)
                .map_err(|reason| anyhow!("cannot start typing: {reason}"))?;

            print_summary(&summary);
            print_simulated_text(&typist);

            match summary.outcome {
                Outcome::Completed => {}
                Outcome::Stopped => return Err(anyhow!("aborted")),
                Outcome::Disconnected => {
                    return Err(anyhow!(
                        "output disconnected after {} of {} chars",
                        summary.emitted,
                        summary.total
                    ))
                }
            }
        }
        Command::Serve { typing } => {
            init_logging(cli.verbose.saturating_add(1), typing.log_file.as_deref())?;
            resolve_backend(typing.backend.to_library())?;

            let (requests_tx, requests_rx) = mpsc::channel();
            let shutdown = Arc::new(AtomicBool::new(false));
            install_interrupt(requests_tx.clone(), shutdown.clone())?;
            spawn_control_reader(requests_tx.clone(), shutdown.clone());

            let mut typist = build_typist(&typing, requests_rx, &shutdown)?;
            eprintln!("Ready. Commands: start PATH | type TEXT | pause | stop | status | log | config K=V... | preset NAME | quit");
            typist.serve(&shutdown);

            if let Some(summary) = typist.last_session() {
                print_summary(summary);
            }
            print_simulated_text(&typist);
        }
    }

    Ok(())
}
