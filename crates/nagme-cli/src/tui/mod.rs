//! Terminal user interface (TUI) for nagme.
//!
//! ## Entry points
//!
//! - [`run_tui`]: the interactive nag list, refreshed in the background.

pub mod list;

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::{info, warn};

use nagme_core::NagError;
use nagme_core::event::{CompleteData, EventData, PushData};
use nagme_core::model::{Nag, NagId};
use nagme_core::source::{CurrentState, Generation, Session, StateSource, load_current_state};
use nagme_remote::SupabaseGateway;

use crate::cmd::list::ViewArgs;
use crate::context::{AppContext, Writer};
use list::{Action, NagListView};

enum Message {
    Fetched {
        generation: Generation,
        result: Result<CurrentState, NagError>,
    },
    Written {
        id: NagId,
        verb: &'static str,
        result: Result<(), String>,
    },
}

/// Owns the gateway and session; each fetch and write runs on its own
/// thread and reports back over the channel.
struct Fetcher {
    gateway: Arc<SupabaseGateway>,
    session: Arc<Session>,
    tx: Sender<Message>,
}

impl Fetcher {
    fn spawn(&self, generation: Generation) {
        let gateway = Arc::clone(&self.gateway);
        let session = Arc::clone(&self.session);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = load_current_state(gateway.as_ref(), &session);
            // The receiver is gone once the view has quit.
            let _ = tx.send(Message::Fetched { generation, result });
        });
    }

    fn spawn_write(&self, id: NagId, current: Option<Nag>, data: EventData, source: StateSource, verb: &'static str) {
        let writer = Writer::new(Arc::clone(&self.gateway), Arc::clone(&self.session));
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = writer
                .commit(&id, current, data, source)
                .map(|_| ())
                .map_err(|err| {
                    warn!(nag = %id, error = %format!("{err:#}"), "write failed");
                    format!("{err:#}")
                });
            let _ = tx.send(Message::Written { id, verb, result });
        });
    }
}

/// Run the interactive list until the user quits.
///
/// # Errors
///
/// Config and session failures before the screen opens, and terminal I/O
/// failures while it is open.
pub fn run_tui(args: &ViewArgs, ctx: &AppContext) -> Result<()> {
    let gateway = Arc::new(ctx.gateway()?);
    let session = Arc::new(AppContext::session()?);
    let (tx, rx) = mpsc::channel();
    let fetcher = Fetcher { gateway, session, tx };

    let mut app = NagListView::new(
        args.options(&ctx.config.display),
        ctx.utc_offset_minutes,
        ctx.config.gateway.require_write().is_ok(),
        ctx.config.display.auto_reload_minutes,
    );
    let generation = app.begin_fetch();
    fetcher.spawn(generation);

    enable_raw_mode().context("Failed to enable raw terminal mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let result = run_event_loop(&mut terminal, &mut app, &fetcher, &rx);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    info!("tui closed");
    result
}

fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut NagListView,
    fetcher: &Fetcher,
    rx: &Receiver<Message>,
) -> Result<()> {
    loop {
        while let Ok(message) = rx.try_recv() {
            match message {
                Message::Fetched { generation, result } => {
                    app.receive(generation, result, AppContext::now_ms());
                }
                Message::Written { id, verb, result } => {
                    if app.write_finished(&id, verb, result) == Action::Reload {
                        fetcher.spawn(app.begin_fetch());
                    }
                }
            }
        }

        terminal.draw(|frame| {
            let area = frame.area();
            app.render(frame, area);
        })?;

        let mut action = app.tick(AppContext::now_ms());
        if event::poll(Duration::from_millis(250))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            action = app.handle_key(key);
        }

        match action {
            Action::None => {}
            Action::Reload => fetcher.spawn(app.begin_fetch()),
            Action::Complete { id, occurrence_ms } => {
                let data = EventData::Complete(CompleteData {
                    occurrence_ms,
                    ..CompleteData::default()
                });
                start_write(app, fetcher, id, data, "completed");
            }
            Action::Push { id, by_ms } => {
                let data = EventData::Push(PushData::new(by_ms));
                start_write(app, fetcher, id, data, "pushed");
            }
        }

        if app.should_quit() {
            break;
        }
    }
    Ok(())
}

/// Hand one event to a worker; the list keeps drawing meanwhile.
fn start_write(app: &mut NagListView, fetcher: &Fetcher, id: NagId, data: EventData, verb: &'static str) {
    let current = app.current_nag(&id).cloned();
    app.write_started(&id, verb);
    fetcher.spawn_write(id, current, data, app.state_source(), verb);
}
