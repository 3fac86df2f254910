use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use showdeck::control::BLINK_PHASE;
use showdeck::mode_guard::{AutoConfirm, ConfirmPrompt};
use showdeck::prefs::JsonFilePrefs;
use showdeck::protocol::{ParseError, encode};
use showdeck::render::{render_board, render_catalog, render_statuses};
use showdeck::{
    ControllerConfig, DeviceError, DeviceTransport, HttpTransport, Mode, ModeOutcome, PlayerId, Session,
    ShowId, Verb, catalog, config, status,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("invalid player `{0}`; expected 1-4")]
    InvalidPlayer(String),
    #[error("stdin failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "showdeck", about = "Remote controller for a networked show player")]
struct Cli {
    #[arg(long, env = "SHOWDECK_DEVICE_URL")]
    device_url: Option<String>,

    #[arg(long, env = "SHOWDECK_PREFS_PATH")]
    prefs_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and print the live status once.
    Status(StatusArgs),
    /// Print the show catalog.
    Toc,
    /// Send one transport command.
    Send(SendArgs),
    /// Switch the device mode.
    Mode(ModeArgs),
    /// Interactive controller reading commands from stdin.
    Run,
}

#[derive(Args, Debug)]
struct StatusArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
    player: PlayerId,
    verb: Verb,
    /// Show id for load, play, loop and record.
    #[arg(long)]
    show: Option<String>,
}

#[derive(Args, Debug)]
struct ModeArgs {
    /// single, htp, ltp, priority, recording, or a mode id 0-4.
    mode: Mode,
    /// Answer yes to the stop-players confirmation.
    #[arg(long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = ControllerConfig::from_env()?;
    if let Some(url) = cli.device_url.as_deref() {
        config = config.with_device_url(url)?;
    }
    if let Some(path) = cli.prefs_path {
        config.prefs_path = path;
    }
    let transport: Arc<dyn DeviceTransport> = Arc::new(HttpTransport::new(&config)?);

    match cli.command {
        Command::Status(args) => run_status(transport.as_ref(), &args).await,
        Command::Toc => run_toc(transport.as_ref()).await,
        Command::Send(args) => run_send(transport.as_ref(), &args).await,
        Command::Mode(args) => run_mode(transport, &config, &args).await,
        Command::Run => run_interactive(transport, &config).await,
    }
}

fn open_session(transport: Arc<dyn DeviceTransport>, config: &ControllerConfig) -> Session {
    let prefs = Arc::new(JsonFilePrefs::new(config.prefs_path.clone()));
    Session::new(transport, prefs, config.timings)
}

async fn run_status(transport: &dyn DeviceTransport, args: &StatusArgs) -> Result<(), CliError> {
    let statuses = status::parse_status(&transport.fetch_status().await?)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        print!("{}", render_statuses(&statuses));
    }
    Ok(())
}

async fn run_toc(transport: &dyn DeviceTransport) -> Result<(), CliError> {
    let catalog = catalog::parse_catalog(&transport.fetch_catalog().await?)?;
    print!("{}", render_catalog(&catalog));
    Ok(())
}

async fn run_send(transport: &dyn DeviceTransport, args: &SendArgs) -> Result<(), CliError> {
    let wire = encode(args.player, args.verb, args.show.as_deref());
    transport.send_command(&wire).await?;
    println!("{wire}");
    Ok(())
}

async fn run_mode(transport: Arc<dyn DeviceTransport>, config: &ControllerConfig, args: &ModeArgs) -> Result<(), CliError> {
    let session = open_session(transport, config);
    if let Some(current) = session.persisted_mode() {
        session.assume_mode(current);
    }
    let outcome = if args.yes {
        session.change_mode(args.mode, &AutoConfirm(true)).await?
    } else {
        session.change_mode(args.mode, &StdinPrompt::new()).await?
    };
    print_mode_outcome(outcome);
    Ok(())
}

fn print_mode_outcome(outcome: ModeOutcome) {
    match outcome {
        ModeOutcome::Applied(mode) => println!("mode: {mode}"),
        ModeOutcome::Unchanged => println!("mode unchanged"),
        ModeOutcome::Cancelled => println!("mode change cancelled"),
    }
}

// =============================================================================
// INTERACTIVE
// =============================================================================

type StdinLines = Lines<BufReader<Stdin>>;

/// Confirmation read from the same stdin stream as the command loop.
struct StdinPrompt {
    lines: Arc<Mutex<StdinLines>>,
}

impl StdinPrompt {
    fn new() -> Self {
        Self { lines: Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines())) }
    }

    async fn next_line(&self) -> Result<Option<String>, std::io::Error> {
        self.lines.lock().await.next_line().await
    }
}

#[async_trait::async_trait]
impl ConfirmPrompt for StdinPrompt {
    async fn confirm(&self, prompt: &str) -> bool {
        println!("{prompt} [y/N]");
        match self.next_line().await {
            Ok(Some(answer)) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

enum Input {
    Select(PlayerId, ShowId),
    Click(PlayerId, Verb),
    Mode(Mode),
    Board,
    Help,
    Quit,
}

const HELP: &str = "commands: select P SS | click P VERB | mode NAME | board | help | quit";

fn parse_player(raw: &str) -> Result<PlayerId, CliError> {
    raw.parse::<PlayerId>()
        .ok()
        .filter(|p| (1..=showdeck::protocol::MAX_PLAYERS).contains(p))
        .ok_or_else(|| CliError::InvalidPlayer(raw.to_owned()))
}

fn parse_input(line: &str) -> Result<Option<Input>, CliError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let input = match words.as_slice() {
        [] => return Ok(None),
        ["select", player, show] => Input::Select(parse_player(player)?, ShowId::new(show)),
        ["click", player, verb] => Input::Click(parse_player(player)?, verb.parse()?),
        ["mode", mode] => Input::Mode(mode.parse()?),
        ["board"] => Input::Board,
        ["quit" | "exit"] => Input::Quit,
        _ => Input::Help,
    };
    Ok(Some(input))
}

async fn run_interactive(transport: Arc<dyn DeviceTransport>, config: &ControllerConfig) -> Result<(), CliError> {
    let session = Arc::new(open_session(transport, config));
    session.start().await;
    let renderer = tokio::spawn(render_loop(session.clone()));
    let prompt = StdinPrompt::new();
    println!("{HELP}");

    while let Some(line) = prompt.next_line().await? {
        let input = match parse_input(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match input {
            Input::Select(player, show) => {
                session.select_show(player, show);
            }
            Input::Click(player, verb) => {
                let session = session.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.click(player, verb).await {
                        eprintln!("{e}");
                    }
                });
            }
            Input::Mode(mode) => match session.change_mode(mode, &prompt).await {
                Ok(outcome) => print_mode_outcome(outcome),
                Err(e) => eprintln!("mode change failed: {e}"),
            },
            Input::Board => print!("{}", render_board(&session.snapshot(), Instant::now())),
            Input::Help => println!("{HELP}"),
            Input::Quit => break,
        }
    }

    renderer.abort();
    session.stop();
    Ok(())
}

/// Re-render on every model change, and on the blink timer while any
/// control is in flight.
async fn render_loop(session: Arc<Session>) {
    let mut revisions = session.subscribe();
    let mut blink = tokio::time::interval(BLINK_PHASE);
    blink.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = blink.tick() => {
                if !session.snapshot().controls.iter().any(|c| c.is_in_flight()) {
                    continue;
                }
            }
        }
        print!("{}", render_board(&session.snapshot(), Instant::now()));
    }
}
