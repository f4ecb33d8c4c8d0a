use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use crossbeam_channel::select;
use ttyclutch::config::{self, SessionConfig};
use ttyclutch::tui::termination::{install_termination_signals, TerminationSignal};
use ttyclutch::tui::{DevTtyDriver, InputEvent, MouseMode, SessionEvent};
use ttyclutch::Session;

mod logging;

/// ttyclutch - engage the controlling terminal and echo what it receives
#[derive(Parser)]
#[command(name = "ttyclutch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (default: <cache>/ttyclutch/settings.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Mouse reporting mode
    #[arg(long, value_enum, value_name = "MODE")]
    mouse: Option<MouseArg>,

    /// Enable bracketed paste
    #[arg(long)]
    paste: bool,

    /// Terminal type override
    #[arg(long, value_name = "TERM")]
    term: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum MouseArg {
    Off,
    Buttons,
    Drag,
    Motion,
}

impl From<MouseArg> for MouseMode {
    fn from(arg: MouseArg) -> Self {
        match arg {
            MouseArg::Off => MouseMode::Off,
            MouseArg::Buttons => MouseMode::Buttons,
            MouseArg::Drag => MouseMode::Drag,
            MouseArg::Motion => MouseMode::Motion,
        }
    }
}

enum Exit {
    Quit,
    Signal(TerminationSignal),
}

fn load(cli: &Cli) -> anyhow::Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => config::load_settings().unwrap_or_default(),
    };
    if let Some(mouse) = cli.mouse {
        config.mouse = mouse.into();
    }
    if cli.paste {
        config.bracketed_paste = true;
    }
    if let Some(term) = &cli.term {
        config.term = Some(term.clone());
    }
    Ok(config)
}

fn describe(event: &InputEvent) -> String {
    match event {
        InputEvent::Bytes(bytes) => format!("bytes {:02x?}", bytes),
        InputEvent::Key(c) => format!("key {:?}", c),
        InputEvent::Paste(text) => format!("paste {} chars", text.chars().count()),
        InputEvent::Mouse {
            column,
            row,
            button,
        } => format!("mouse {} at {},{}", button, column, row),
    }
}

fn command_byte(event: &InputEvent) -> Option<u8> {
    match event {
        InputEvent::Bytes(bytes) if bytes.len() == 1 => Some(bytes[0]),
        InputEvent::Key(c) if c.is_ascii() => Some(*c as u8),
        _ => None,
    }
}

fn run(
    session: &Session,
    events: crossbeam_channel::Receiver<SessionEvent>,
) -> anyhow::Result<Exit> {
    let (signal_tx, signal_rx) = crossbeam_channel::unbounded();
    let _signals =
        install_termination_signals(signal_tx).context("failed to install signal handlers")?;

    session.engage().context("failed to engage terminal")?;
    session.write_str("ttyclutch: b beeps, s suspends for a second, q quits\r\n")?;

    loop {
        select! {
            recv(signal_rx) -> signal => {
                if let Ok(signal) = signal {
                    return Ok(Exit::Signal(signal));
                }
            }
            recv(events) -> event => {
                let Ok(event) = event else {
                    return Ok(Exit::Quit);
                };
                match event {
                    SessionEvent::Input(input) => {
                        session.write_str(&format!("{}\r\n", describe(&input)))?;
                        match command_byte(&input) {
                            Some(b'q') => return Ok(Exit::Quit),
                            Some(b'b') => session.beep()?,
                            Some(b's') => {
                                session.suspend();
                                std::thread::sleep(Duration::from_secs(1));
                                session.resume().context("failed to resume")?;
                                session.write_str("resumed\r\n")?;
                            }
                            _ => {}
                        }
                    }
                    SessionEvent::Resize(size) => {
                        session.write_str(&format!("resize {}\r\n", size))?;
                    }
                    SessionEvent::InputClosed => {
                        tracing::warn!("terminal input closed");
                        return Ok(Exit::Quit);
                    }
                }
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logging = logging::init();

    let config = load(&cli)?;
    tracing::info!(?config, "starting");

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let session =
        Session::new(DevTtyDriver::new(), config).with_handler(move |event: SessionEvent| {
            let _ = event_tx.send(event);
        });

    let exit = run(&session, event_rx);
    session.finalize();

    match exit? {
        Exit::Quit => Ok(()),
        Exit::Signal(signal) => {
            tracing::info!(?signal, "exiting on signal");
            // process::exit skips destructors; flush the log writer first.
            drop(logging);
            std::process::exit(signal.exit_code());
        }
    }
}
