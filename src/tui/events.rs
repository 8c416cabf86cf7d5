use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use futures::{FutureExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum Event {
    Tick,
    Key(KeyEvent),
    Resize(u16, u16),
    Shutdown,
}

/// Pumps terminal input, refresh ticks, and SIGINT into one channel so
/// the dashboard loop stays single-threaded.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    handler: Option<tokio::task::JoinHandle<()>>,
}

impl EventHandler {
    pub fn new(tick_rate: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let tick_rate = Duration::from_millis(tick_rate);

        let handler = tokio::spawn(async move {
            let mut reader = event::EventStream::new();
            let mut tick = tokio::time::interval(tick_rate);

            // Try to set up a SIGINT handler, but continue without it if
            // that fails; 'q' still quits.
            #[cfg(unix)]
            let mut sigint = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::interrupt(),
            ) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Failed to create SIGINT handler: {}. Use 'q' to quit.", e);
                    None
                }
            };

            loop {
                let tick_delay = tick.tick();
                let crossterm_event = reader.next().fuse();

                tokio::select! {
                    _ = async {
                        #[cfg(unix)]
                        if let Some(ref mut s) = sigint {
                            s.recv().await
                        } else {
                            std::future::pending::<Option<()>>().await
                        }
                        #[cfg(not(unix))]
                        std::future::pending::<Option<()>>().await
                    } => {
                        let _ = tx.send(Event::Shutdown);
                        break;
                    }
                    _ = tick_delay => {
                        let _ = tx.send(Event::Tick);
                    }
                    Some(Ok(evt)) = crossterm_event => {
                        match evt {
                            CrosstermEvent::Key(key) => {
                                let _ = tx.send(Event::Key(key));
                            }
                            CrosstermEvent::Resize(w, h) => {
                                let _ = tx.send(Event::Resize(w, h));
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        Self {
            rx,
            handler: Some(handler),
        }
    }

    /// Clean up by aborting the pump task.
    pub fn shutdown(mut self) {
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
