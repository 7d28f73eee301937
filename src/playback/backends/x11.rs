use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, GetInputFocusReply};
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::protocol::{xproto, xtest};
use x11rb::rust_connection::RustConnection;

use crate::keyboard::{keystroke_for_char, KeyStroke, KEY_BACKSPACE, KEY_LEFTSHIFT};
use crate::playback::OutputSink;

use super::COMMON_MODIFIER_KEYCODES;

fn evdev_to_x11_keycode(evdev_keycode: u32) -> Result<u8> {
    // On most Linux Xorg setups, X11 keycodes are evdev + 8.
    let x11 = evdev_keycode
        .checked_add(8)
        .ok_or_else(|| anyhow!("evdev keycode overflow"))?;
    u8::try_from(x11).map_err(|_| anyhow!("evdev keycode {evdev_keycode} out of range for X11"))
}

fn query_xtest(conn: &impl Connection) -> Result<()> {
    let ext = conn
        .extension_information(xtest::X11_EXTENSION_NAME)
        .context("failed to query X11 extension info")?;

    if ext.is_none() {
        return Err(anyhow!(
            "X11 backend requires the XTEST extension (not present on this X server)"
        ));
    }

    if let Some(version) = conn
        .xtest_get_version(2, 2)
        .ok()
        .and_then(|cookie| cookie.reply().ok())
    {
        debug!(
            major = version.major_version,
            minor = version.minor_version,
            "XTEST available"
        );
    }

    Ok(())
}

fn get_focus(conn: &impl Connection) -> Result<GetInputFocusReply> {
    conn.get_input_focus()
        .context("failed to request input focus")?
        .reply()
        .context("failed to read input focus reply")
}

fn keysyms_for_keycode(conn: &impl Connection, keycode: u8) -> Result<(xproto::Keysym, xproto::Keysym)> {
    let reply = conn
        .get_keyboard_mapping(keycode, 1)
        .context("failed to request keyboard mapping")?
        .reply()
        .context("failed to read keyboard mapping")?;

    if reply.keysyms_per_keycode == 0 {
        return Err(anyhow!("X server returned 0 keysyms per keycode"));
    }

    let at = |i: usize| reply.keysyms.get(i).copied().unwrap_or(x11rb::NO_SYMBOL);
    Ok((at(0), at(1)))
}

/// Check a handful of representative keys against US QWERTY. Latin-1
/// keysyms equal their character codes.
fn validate_us_keymap(conn: &impl Connection) -> Result<()> {
    let checks = [
        (crate::keyboard::KEY_A, 'a', 'A'),
        (crate::keyboard::KEY_Q, 'q', 'Q'),
        (crate::keyboard::KEY_1, '1', '!'),
        (crate::keyboard::KEY_MINUS, '-', '_'),
        (crate::keyboard::KEY_APOSTROPHE, '\'', '"'),
        (crate::keyboard::KEY_LEFTBRACE, '[', '{'),
        (crate::keyboard::KEY_SEMICOLON, ';', ':'),
    ];

    for (evdev, plain, shifted) in checks {
        let keycode = evdev_to_x11_keycode(evdev)?;
        let (got_plain, got_shifted) = keysyms_for_keycode(conn, keycode)?;

        if got_plain == x11rb::NO_SYMBOL || got_shifted == x11rb::NO_SYMBOL {
            return Err(anyhow!(
                "X11 backend could not validate the X server keymap: keycode {keycode} returned NoSymbol. This backend assumes X11 keycodes are evdev+8 and requires a US keymap."
            ));
        }
        if got_plain != plain as u32 || got_shifted != shifted as u32 {
            return Err(anyhow!(
                "X11 backend requires a US keyboard layout, but the X server keymap does not match (keycode {keycode}: got {got_plain:#x}/{got_shifted:#x}). Try `setxkbmap us`."
            ));
        }
    }

    Ok(())
}

fn require_explicit_focus(conn: &impl Connection) -> Result<()> {
    // PointerRoot means focus follows the pointer; typing would land wherever it drifts.
    const POINTER_ROOT: xproto::Window = 1;

    let focus = get_focus(conn)?;
    if focus.focus == x11rb::NONE {
        return Err(anyhow!(
            "no X11 input focus detected; click into the target window before starting"
        ));
    }
    if focus.focus == POINTER_ROOT {
        return Err(anyhow!(
            "X11 input focus is set to PointerRoot; click into the target window to give it explicit focus before starting"
        ));
    }
    Ok(())
}

/// Output sink that injects key events through XTEST.
pub struct X11Sink {
    conn: RustConnection,
    root: xproto::Window,
    connected: bool,
}

impl X11Sink {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("failed to connect to X11")?;
        query_xtest(&conn)?;
        validate_us_keymap(&conn)?;
        require_explicit_focus(&conn)?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| anyhow!("invalid X11 screen index"))?;

        let sink = Self {
            conn,
            root,
            connected: true,
        };
        sink.reset_modifiers_best_effort();
        Ok(sink)
    }

    fn key(&self, evdev_keycode: u32, event_type: u8) -> Result<()> {
        let keycode = evdev_to_x11_keycode(evdev_keycode)?;
        self.conn
            .xtest_fake_input(event_type, keycode, x11rb::CURRENT_TIME, self.root, 0, 0, 0)
            .context("failed to send XTEST fake input")?;
        Ok(())
    }

    fn tap(&self, stroke: KeyStroke) -> Result<()> {
        if stroke.shift {
            self.key(KEY_LEFTSHIFT, xproto::KEY_PRESS_EVENT)?;
        }
        self.key(stroke.keycode, xproto::KEY_PRESS_EVENT)?;
        self.key(stroke.keycode, xproto::KEY_RELEASE_EVENT)?;
        if stroke.shift {
            self.key(KEY_LEFTSHIFT, xproto::KEY_RELEASE_EVENT)?;
        }
        self.conn.flush().context("failed to flush X11 connection")?;
        Ok(())
    }

    fn emit(&mut self, stroke: KeyStroke) {
        if !self.connected {
            return;
        }
        if let Err(err) = self.tap(stroke) {
            let error = format!("{err:#}");
            warn!(%error, "X11 output failed; marking sink disconnected");
            self.connected = false;
        }
    }

    fn reset_modifiers_best_effort(&self) {
        for keycode in COMMON_MODIFIER_KEYCODES {
            let _ = self.key(keycode, xproto::KEY_RELEASE_EVENT);
        }
        let _ = self.conn.flush();
    }
}

impl OutputSink for X11Sink {
    fn send(&mut self, c: char) {
        match keystroke_for_char(c) {
            Some(stroke) => self.emit(stroke),
            // A bare CR has no key; the LF that usually follows carries the line break.
            None if c == '\r' => {}
            None => warn!(?c, "no US-QWERTY key for character; skipped"),
        }
    }

    fn send_backspace(&mut self) {
        self.emit(KeyStroke {
            keycode: KEY_BACKSPACE,
            shift: false,
        });
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for X11Sink {
    fn drop(&mut self) {
        if self.connected {
            self.reset_modifiers_best_effort();
        }
    }
}
