use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEvent, MouseEvent};

use crate::live::LiveMessage;

/// Unified application event.
#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    /// The trace file being shown was modified on disk.
    TraceChanged,
    Live(LiveMessage),
    Tick,
}

/// Spawn a thread that polls crossterm input events and sends them to the channel.
pub fn spawn_key_reader(tx: mpsc::Sender<AppEvent>) {
    std::thread::spawn(move || loop {
        if event::poll(Duration::from_millis(50)).unwrap_or(false) {
            let app_event = match event::read() {
                Ok(Event::Key(key)) => AppEvent::Key(key),
                Ok(Event::Mouse(mouse)) => AppEvent::Mouse(mouse),
                _ => continue,
            };
            if tx.send(app_event).is_err() {
                break;
            }
        }
    });
}

/// Spawn a tick timer that sends Tick events at the given interval.
pub fn spawn_tick_timer(tx: mpsc::Sender<AppEvent>, interval: Duration) {
    std::thread::spawn(move || loop {
        std::thread::sleep(interval);
        if tx.send(AppEvent::Tick).is_err() {
            break;
        }
    });
}

/// Forward a live session's messages into the UI channel. Ends when either
/// side hangs up.
pub fn spawn_live_forwarder(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<LiveMessage>,
    tx: mpsc::Sender<AppEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if tx.send(AppEvent::Live(message)).is_err() {
                break;
            }
        }
    })
}
