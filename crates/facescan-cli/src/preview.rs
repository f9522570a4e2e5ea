//! Terminal debug preview: a status readout plus single-key controls.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use facescan_core::{BoundingBox, Control, Preview};
use image::GrayImage;
use std::io::{self, Write};
use std::time::Duration;

const KEY_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Raw-mode terminal preview. Raw mode is restored on drop.
pub struct TerminalPreview {
    last_face_count: Option<usize>,
}

impl TerminalPreview {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self {
            last_face_count: None,
        })
    }
}

impl Drop for TerminalPreview {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!(error = %e, "failed to restore terminal mode");
        }
    }
}

impl Preview for TerminalPreview {
    fn show(&mut self, frame: &GrayImage, faces: &[BoundingBox], saved: &[String]) {
        if self.last_face_count != Some(faces.len()) {
            self.last_face_count = Some(faces.len());
            let boxes: Vec<String> = faces
                .iter()
                .map(|f| format!("{:.0}x{:.0}@({:.0},{:.0})", f.width, f.height, f.x, f.y))
                .collect();
            status(&format!(
                "[{}x{}] {} face(s) {}",
                frame.width(),
                frame.height(),
                faces.len(),
                boxes.join(" ")
            ));
        }
        for face_id in saved {
            status(&format!("Saved: {face_id}"));
        }
    }

    fn poll(&mut self) -> Control {
        match event::poll(KEY_POLL_TIMEOUT) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key_control(&key),
                _ => Control::Continue,
            },
            Ok(false) => Control::Continue,
            Err(e) => {
                tracing::warn!(error = %e, "keyboard poll failed");
                Control::Continue
            }
        }
    }

    fn manual_saved(&mut self, face_id: &str) {
        status(&format!("Manually saved face: {face_id}"));
    }
}

/// Map a key press to a session control: `q`/Esc/Ctrl-C quit, `s` saves one face.
pub fn key_control(key: &KeyEvent) -> Control {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Control::Quit,
        KeyCode::Char('q') | KeyCode::Esc => Control::Quit,
        KeyCode::Char('s') => Control::SaveOne,
        _ => Control::Continue,
    }
}

/// Print one line; `\r\n` keeps raw-mode output aligned.
pub fn status(line: &str) {
    let mut out = io::stdout().lock();
    let _ = write!(out, "{line}\r\n");
    let _ = out.flush();
}
