//! Interactive dashboard: terminal lifecycle and the main event loop.

use crate::config::Config;
use crate::error::Result;
use crate::session::SessionManager;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;

pub mod app;
pub mod events;
pub mod ui;

use app::App;
use events::EventHandler;

/// Refresh tick in milliseconds.
const TICK_RATE_MS: u64 = 500;

/// Run the dashboard until the operator quits.
pub async fn run(manager: SessionManager, config: &Config) -> Result<()> {
    // Restore the terminal on panic, before the default hook prints.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = execute!(io::stdout(), crossterm::cursor::Show);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (mut app, mut msgs) = App::new(manager, config);
    let events = EventHandler::new(TICK_RATE_MS);

    let result = run_app(&mut terminal, &mut app, &mut msgs, events).await;

    let cleanup_result = restore_terminal(&mut terminal);

    match (result, cleanup_result) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), _) => Err(e),
        (Ok(()), Err(e)) => Err(e.into()),
    }
}

fn restore_terminal<B: ratatui::backend::Backend + std::io::Write>(
    terminal: &mut Terminal<B>,
) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        crossterm::cursor::Show
    )?;
    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    msgs: &mut tokio::sync::mpsc::UnboundedReceiver<app::AppMsg>,
    mut events: EventHandler,
) -> Result<()> {
    // First snapshot before the first frame.
    app.on_tick();

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        tokio::select! {
            event = events.next() => {
                match event {
                    Some(events::Event::Tick) => app.on_tick(),
                    Some(events::Event::Key(key)) => {
                        if !app.handle_key(key) {
                            break;
                        }
                    }
                    Some(events::Event::Resize(width, height)) => {
                        app.on_resize(width, height);
                    }
                    Some(events::Event::Shutdown) | None => break,
                }
            }
            msg = msgs.recv() => {
                if let Some(msg) = msg {
                    app.handle_msg(msg);
                }
            }
        }
    }

    app.quit();
    events.shutdown();
    Ok(())
}
