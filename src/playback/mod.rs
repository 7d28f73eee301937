pub mod backends;
mod util;

use anyhow::{anyhow, Result};

use crate::sim::SimulatedEditor;
use backends::console::ConsoleSink;

pub use util::countdown;

/// Where typed characters go. Emission is fire-and-forget; callers check
/// [`OutputSink::is_connected`] before every send.
pub trait OutputSink {
    fn send(&mut self, c: char);
    fn send_backspace(&mut self);
    fn is_connected(&self) -> bool;
}

impl<T: OutputSink + ?Sized> OutputSink for Box<T> {
    fn send(&mut self, c: char) {
        (**self).send(c);
    }

    fn send_backspace(&mut self) {
        (**self).send_backspace();
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBackend {
    Auto,
    X11,
    Console,
    Sim,
}

fn env_is_set(name: &str) -> bool {
    std::env::var_os(name)
        .map(|v| !v.is_empty())
        .unwrap_or(false)
}

fn detected_environment() -> String {
    let mut parts = Vec::new();
    for name in ["DISPLAY", "WAYLAND_DISPLAY"] {
        if env_is_set(name) {
            parts.push(format!("{name} is set"));
        }
    }
    if let Ok(kind) = std::env::var("XDG_SESSION_TYPE") {
        if !kind.is_empty() {
            parts.push(format!("XDG_SESSION_TYPE={kind}"));
        }
    }

    if parts.is_empty() {
        "No display session detected (DISPLAY is not set).".to_string()
    } else {
        format!("Detected environment: {}", parts.join(", "))
    }
}

/// Pick a concrete backend. Auto only ever resolves to X11; console and sim
/// output must be asked for.
pub fn resolve_backend(requested: SinkBackend) -> Result<SinkBackend> {
    match requested {
        SinkBackend::Auto => {
            if env_is_set("DISPLAY") && cfg!(feature = "x11") {
                return Ok(SinkBackend::X11);
            }
            let hint = if cfg!(feature = "x11") {
                "Run inside an X11 (or Xwayland) session, or pass --backend console."
            } else {
                "This build has no X11 support; pass --backend console or --backend sim."
            };
            Err(anyhow!(
                "No supported output backend detected. {details}\n{hint}",
                details = detected_environment(),
            ))
        }
        SinkBackend::X11 => {
            if cfg!(feature = "x11") {
                Ok(SinkBackend::X11)
            } else {
                Err(anyhow!(
                    "X11 backend requested but is disabled in this build. (Rebuild with `--features x11`.) {}",
                    detected_environment()
                ))
            }
        }
        other => Ok(other),
    }
}

/// A sink chosen at runtime.
pub enum AnySink {
    #[cfg(feature = "x11")]
    X11(backends::x11::X11Sink),
    Console(ConsoleSink),
    Sim(SimulatedEditor),
}

impl OutputSink for AnySink {
    fn send(&mut self, c: char) {
        match self {
            #[cfg(feature = "x11")]
            AnySink::X11(sink) => sink.send(c),
            AnySink::Console(sink) => sink.send(c),
            AnySink::Sim(sink) => sink.send(c),
        }
    }

    fn send_backspace(&mut self) {
        match self {
            #[cfg(feature = "x11")]
            AnySink::X11(sink) => sink.send_backspace(),
            AnySink::Console(sink) => sink.send_backspace(),
            AnySink::Sim(sink) => sink.send_backspace(),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            #[cfg(feature = "x11")]
            AnySink::X11(sink) => sink.is_connected(),
            AnySink::Console(sink) => sink.is_connected(),
            AnySink::Sim(sink) => sink.is_connected(),
        }
    }
}

/// Resolve `requested` and connect to it.
pub fn open_sink(requested: SinkBackend) -> Result<AnySink> {
    match resolve_backend(requested)? {
        SinkBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                Ok(AnySink::X11(backends::x11::X11Sink::connect()?))
            }

            #[cfg(not(feature = "x11"))]
            {
                Err(anyhow!(
                    "X11 backend is disabled in this build (rebuild with `--features x11`)."
                ))
            }
        }
        SinkBackend::Console => Ok(AnySink::Console(ConsoleSink::stdout())),
        SinkBackend::Sim => Ok(AnySink::Sim(SimulatedEditor::new())),
        SinkBackend::Auto => Err(anyhow!("no backend resolved")),
    }
}
