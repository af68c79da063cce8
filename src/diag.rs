//! Where diagnostics end up.
//!
//! Everything the agent reports goes through `tracing`. Depending on the
//! verbosity, formatted lines are printed to stdout, drawn as rows on a
//! surface, both or neither. Lines are cut at [`MAX_LINE`] characters.
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::{Arc, Mutex},
};

use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::conf::Verbosity;

pub const MAX_LINE: usize = 256;

/// Height of one row, and where the first row sits.
const ROW_HEIGHT: u16 = 13;
/// Once the cursor passes this the surface is wiped and drawing restarts at the top.
const SURFACE_EXTENT: u16 = 600;

/// Cuts `line` to at most [`MAX_LINE`] characters.
pub fn truncate_line(line: &str) -> &str {
    match line.char_indices().nth(MAX_LINE) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

pub trait Canvas {
    fn clear(&mut self) -> io::Result<()>;

    /// Draws `text` on the row whose baseline is `y`.
    fn draw(&mut self, y: u16, text: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;
}

/// Successive rows on a canvas, wrapping back to the top.
pub struct Panel<C> {
    canvas: C,
    y: u16,
}

impl<C> Panel<C>
where
    C: Canvas,
{
    pub fn new(canvas: C) -> Self {
        Self {
            canvas,
            y: ROW_HEIGHT,
        }
    }

    pub fn draw_line(&mut self, text: &str) -> io::Result<()> {
        self.canvas.draw(self.y, truncate_line(text))?;
        self.y += ROW_HEIGHT;
        if self.y > SURFACE_EXTENT {
            self.canvas.clear()?;
            self.y = ROW_HEIGHT;
        }
        self.canvas.flush()
    }
}

/// Renders rows onto a terminal device with cursor addressing.
pub struct TtyCanvas {
    out: File,
}

impl TtyCanvas {
    pub fn open(path: &Path) -> io::Result<Self> {
        let out = OpenOptions::new().write(true).open(path)?;
        Ok(Self { out })
    }
}

impl Canvas for TtyCanvas {
    fn clear(&mut self) -> io::Result<()> {
        self.out.write_all(b"\x1b[2J")
    }

    fn draw(&mut self, y: u16, text: &str) -> io::Result<()> {
        let row = y / ROW_HEIGHT;
        write!(self.out, "\x1b[{row};1H\x1b[2K{text}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// `io::Write` end of a shared panel, one instance per formatted event.
pub struct SurfaceWriter<C> {
    panel: Arc<Mutex<Panel<C>>>,
}

impl<C> Clone for SurfaceWriter<C> {
    fn clone(&self) -> Self {
        Self {
            panel: self.panel.clone(),
        }
    }
}

impl<C> SurfaceWriter<C>
where
    C: Canvas,
{
    pub fn new(canvas: C) -> Self {
        Self {
            panel: Arc::new(Mutex::new(Panel::new(canvas))),
        }
    }
}

impl<C> Write for SurfaceWriter<C>
where
    C: Canvas,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let mut panel = self
            .panel
            .lock()
            .map_err(|_| io::Error::other("surface lock poisoned"))?;
        for line in text.lines().filter(|line| !line.is_empty()) {
            panel.draw_line(line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Stdout, one truncated line per line written.
#[derive(Default)]
pub struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let mut stdout = io::stdout().lock();
        for line in text.lines() {
            writeln!(stdout, "{}", truncate_line(line))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`.
pub fn init(verbosity: Verbosity, surface: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = verbosity.console().then(|| {
        fmt::layer()
            .with_writer(ConsoleWriter::default)
            .with_ansi(false)
            .with_target(false)
            .without_time()
    });

    let mut surface_err = None;
    let surface_layer = if verbosity.surface() {
        match TtyCanvas::open(surface) {
            Ok(canvas) => {
                let writer = SurfaceWriter::new(canvas);
                Some(
                    fmt::layer()
                        .with_writer(move || writer.clone())
                        .with_ansi(false)
                        .with_target(false)
                        .with_level(false)
                        .without_time(),
                )
            }
            Err(e) => {
                surface_err = Some(e);
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(surface_layer)
        .init();

    if let Some(e) = surface_err {
        warn!("- Can't open surface {}: {}", surface.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records what was drawn: `Some(text)` per row, `None` per clear.
    #[derive(Clone, Default)]
    struct Recorder {
        ops: Arc<Mutex<Vec<Option<(u16, String)>>>>,
    }

    impl Canvas for Recorder {
        fn clear(&mut self) -> io::Result<()> {
            self.ops.lock().unwrap().push(None);
            Ok(())
        }

        fn draw(&mut self, y: u16, text: &str) -> io::Result<()> {
            self.ops.lock().unwrap().push(Some((y, text.to_string())));
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn truncates_on_char_boundary() {
        let long = "é".repeat(MAX_LINE + 5);
        assert_eq!(truncate_line(&long).chars().count(), MAX_LINE);
        assert_eq!(truncate_line("short"), "short");
    }

    #[test]
    fn rows_advance_then_wrap_after_clear() {
        let recorder = Recorder::default();
        let mut panel = Panel::new(recorder.clone());
        let rows = (SURFACE_EXTENT / ROW_HEIGHT) as usize;
        for i in 0..=rows {
            panel.draw_line(&format!("line {i}")).unwrap();
        }

        let ops = recorder.ops.lock().unwrap();
        assert_eq!(ops[0], Some((13, "line 0".into())));
        assert_eq!(ops[1], Some((26, "line 1".into())));
        // 13 * 46 = 598 is the last row, drawing it pushes the cursor past 600
        assert_eq!(ops[45], Some((598, "line 45".into())));
        assert_eq!(ops[46], None);
        assert_eq!(ops[47], Some((13, "line 46".into())));
    }

    #[test]
    fn layer_draws_each_event_as_a_row() {
        let recorder = Recorder::default();
        let writer = SurfaceWriter::new(recorder.clone());
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .with_target(false)
                .with_level(false)
                .without_time(),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("+ Restarting wm ..");
            tracing::info!("{}", "x".repeat(400));
        });

        let ops = recorder.ops.lock().unwrap();
        assert_eq!(ops.len(), 2);
        match &ops[0] {
            Some((13, text)) => assert!(text.ends_with("+ Restarting wm ..")),
            other => panic!("unexpected {other:?}"),
        }
        match &ops[1] {
            Some((26, text)) => assert_eq!(text.chars().count(), MAX_LINE),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tty_canvas_addresses_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surface");
        File::create(&path).unwrap();

        let mut panel = Panel::new(TtyCanvas::open(&path).unwrap());
        panel.draw_line("hello").unwrap();
        panel.draw_line("again").unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, b"\x1b[1;1H\x1b[2Khello\x1b[2;1H\x1b[2Kagain");
    }
}
