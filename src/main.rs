mod ui;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Mutex};
use std::time::Duration;

use clap::{Parser as ClapParser, Subcommand};
use color_eyre::eyre::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_subscriber::EnvFilter;

use watchtower::analysis::{analyze_trace, TraceAnalysis};
use watchtower::app::{App, Source};
use watchtower::config::{config_dir, Config, ConfigCache};
use watchtower::error::WatchtowerError;
use watchtower::events::{self, AppEvent};
use watchtower::export::{export_trace, ExportFormat, ExportOptions};
use watchtower::format::{format_duration, format_timestamp, format_tokens, TimestampFormat};
use watchtower::live::LiveSession;
use watchtower::trace::{parse_trace_file, parse_trace_reader, ParsedTrace};

#[derive(ClapParser, Debug)]
#[command(name = "watchtower", version, about = "Inspect and tail AI agent traces")]
struct Cli {
    /// Config file (defaults to $WATCHTOWER_CONFIG_DIR/cli.toml or ~/.watchtower/cli.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Browse a saved JSONL trace.
    Show {
        trace: PathBuf,

        /// Print a summary to stdout instead of launching the TUI.
        #[arg(long)]
        dump: bool,

        /// Reload the trace whenever the file changes.
        #[arg(short, long)]
        follow: bool,
    },
    /// Run a command and stream its trace events live.
    Tail {
        /// Interpreter used for `.py` scripts (defaults to the configured one).
        #[arg(long)]
        python: Option<String>,

        /// Command and arguments, e.g. `-- python agent.py --verbose`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Write a trace to JSON, CSV or Markdown.
    Export {
        trace: PathBuf,

        #[arg(short, long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Output path (defaults to watchtower-<run_id>-<millis>.<ext>).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the active configuration.
    Config {
        /// Write a default config file if none exists.
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    match run(cli) {
        Err(report) => match report.downcast_ref::<WatchtowerError>() {
            Some(err) => {
                eprintln!("{}", err.render());
                std::process::exit(1);
            }
            None => Err(report),
        },
        ok => ok,
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut configs = ConfigCache::new(cli.config.clone().unwrap_or_else(Config::default_path));

    if let Command::Config { init } = &cli.command {
        return show_config(&mut configs, *init);
    }

    let config = configs.get()?.clone();
    let interactive = matches!(
        &cli.command,
        Command::Tail { .. } | Command::Show { dump: false, .. }
    );
    init_tracing(&config, interactive)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    match cli.command {
        Command::Show {
            trace,
            dump,
            follow,
        } => {
            let parsed = runtime.block_on(load_trace(&trace))?;
            if dump {
                dump_trace(&mut io::stdout().lock(), &trace, &parsed, config.timestamp_format)?;
                return Ok(());
            }
            let mut app = App::new(Source::File(trace.clone()), &config);
            app.load_trace(parsed);
            with_terminal(|terminal| run_tui(terminal, &mut app, follow.then_some(trace.as_path())))
        }
        Command::Tail { python, command } => {
            let python = python.unwrap_or_else(|| config.default_python.clone());
            let command = resolve_command(command, &python)?;
            let label = command.join(" ");

            let (live_tx, live_rx) = tokio::sync::mpsc::unbounded_channel();
            let session = LiveSession::spawn(command, live_tx);
            tracing::info!(run_id = session.run_id(), command = %label, "starting live session");

            let mut app = App::live(label, Some(session), &config);
            with_terminal(|terminal| run_live_tui(terminal, &mut app, live_rx))
        }
        Command::Export {
            trace,
            format,
            output,
        } => {
            let parsed = runtime.block_on(load_trace(&trace))?;
            let analysis = analyze_trace(&parsed.events);
            let options = ExportOptions {
                format,
                output_path: output,
            };
            let result = export_trace(&parsed.events, &analysis, &options)?;
            println!("Exported {} ({} bytes)", result.path.display(), result.size);
            Ok(())
        }
        Command::Config { .. } => Ok(()),
    }
}

fn init_tracing(config: &Config, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env("WATCHTOWER_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if to_file {
        // The TUI owns the terminal, so logs go to a file.
        let dir = config_dir();
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("watchtower.log"))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else {
        builder.with_writer(io::stderr).init();
    }
    Ok(())
}

async fn load_trace(path: &Path) -> Result<ParsedTrace> {
    if !path.exists() {
        return Err(WatchtowerError::TraceNotFound(path.to_path_buf()).into());
    }
    Ok(parse_trace_file(path).await?)
}

/// Run `.py` scripts through `python`; anything else is executed as given.
fn resolve_command(command: Vec<String>, python: &str) -> Result<Vec<String>, WatchtowerError> {
    let Some(first) = command.first() else {
        return Err(WatchtowerError::EmptyCommand);
    };
    if first.ends_with(".py") {
        let mut resolved = vec![python.to_string()];
        resolved.extend(command);
        return Ok(resolved);
    }
    Ok(command)
}

fn show_config(configs: &mut ConfigCache, init: bool) -> Result<()> {
    let path = configs.path().to_path_buf();
    if init {
        if Config::init(&path)? {
            println!("Wrote default config to {}", path.display());
        } else {
            println!("Config already exists at {}", path.display());
        }
        configs.invalidate();
    }
    let config = configs.get()?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

type Term = Terminal<CrosstermBackend<io::Stdout>>;

fn with_terminal(body: impl FnOnce(&mut Term) -> Result<()>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = body(&mut terminal);

    // Restore terminal.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

fn run_tui(terminal: &mut Term, app: &mut App, follow: Option<&Path>) -> Result<()> {
    let (tx, rx) = mpsc::channel::<AppEvent>();

    events::spawn_key_reader(tx.clone());
    events::spawn_tick_timer(tx.clone(), Duration::from_millis(250));

    // Set up a watcher on the trace file when following.
    let _watcher = match follow {
        Some(path) => {
            let tx_file = tx.clone();
            let mut watcher = notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        let _ = tx_file.send(AppEvent::TraceChanged);
                    }
                }
            })?;
            watcher.watch(path, RecursiveMode::NonRecursive)?;
            Some(watcher)
        }
        None => None,
    };

    loop {
        terminal.draw(|f| ui::render(f, app))?;

        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(AppEvent::Key(key)) => app.handle_key(key),
            Ok(AppEvent::Mouse(mouse)) => app.handle_mouse(mouse),
            Ok(AppEvent::TraceChanged) => {
                if let Some(path) = follow {
                    match File::open(path).map(BufReader::new) {
                        Ok(reader) => match parse_trace_reader(reader) {
                            Ok(parsed) => app.load_trace(parsed),
                            Err(e) => tracing::warn!(error = %e, "failed to reload trace"),
                        },
                        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to reopen trace"),
                    }
                }
            }
            Ok(AppEvent::Live(_)) | Ok(AppEvent::Tick) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn run_live_tui(
    terminal: &mut Term,
    app: &mut App,
    live_rx: tokio::sync::mpsc::UnboundedReceiver<watchtower::live::LiveMessage>,
) -> Result<()> {
    let (tx, rx) = mpsc::channel::<AppEvent>();

    events::spawn_key_reader(tx.clone());
    events::spawn_tick_timer(tx.clone(), Duration::from_millis(250));
    let forwarder = events::spawn_live_forwarder(live_rx, tx);

    loop {
        app.refresh();
        terminal.draw(|f| ui::render(f, app))?;

        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(AppEvent::Key(key)) => app.handle_key(key),
            Ok(AppEvent::Mouse(mouse)) => app.handle_mouse(mouse),
            Ok(AppEvent::Live(message)) => app.apply_live(message),
            Ok(AppEvent::Tick) => app.tick(),
            Ok(AppEvent::TraceChanged) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if app.should_quit {
            break;
        }
    }

    forwarder.abort();
    Ok(())
}

fn dump_trace(
    out: &mut impl Write,
    path: &Path,
    parsed: &ParsedTrace,
    timestamps: TimestampFormat,
) -> io::Result<()> {
    let analysis: TraceAnalysis = analyze_trace(&parsed.events);
    let s = &analysis.summary;

    writeln!(
        out,
        "Trace: {} ({} events, {} skipped)",
        path.display(),
        parsed.events.len(),
        parsed.errors,
    )?;
    writeln!(out, "  Run: {}  Agent: {}", s.run_id, s.agent_name)?;
    writeln!(
        out,
        "  Duration: {}  LLM calls: {}  Tool calls: {}  Tokens: {}  Errors: {}",
        format_duration(s.duration),
        s.llm_calls,
        s.tool_calls,
        format_tokens(s.total_tokens),
        s.errors,
    )?;
    writeln!(out)?;

    for m in &analysis.models {
        writeln!(
            out,
            "  model {} ({} requests, {} tokens, avg {})",
            m.name,
            m.request_count,
            format_tokens(m.total_tokens),
            format_duration(m.avg_latency_ms),
        )?;
    }
    for t in &analysis.tools {
        writeln!(
            out,
            "  tool {} ({} calls, {} ok, {} errors, avg {})",
            t.name,
            t.call_count,
            t.success_count,
            t.error_count,
            format_duration(t.avg_duration_ms),
        )?;
    }
    writeln!(out)?;

    let reference = parsed.events.first().map(|e| e.timestamp).unwrap_or(0.0);
    for group in &analysis.event_groups {
        if let Some(agent) = group.agent_name().filter(|_| analysis.has_multiple_agents) {
            writeln!(out, "  [{agent}]")?;
        }
        for event in &parsed.events[group.start_index()..=group.end_index()] {
            writeln!(
                out,
                "    {:>10} {:<15} {}",
                format_timestamp(event.timestamp, timestamps, reference),
                event.kind().as_str(),
                event.detail(),
            )?;
        }
    }
    Ok(())
}
