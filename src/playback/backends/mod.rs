pub mod console;

#[cfg(feature = "x11")]
pub mod x11;

// Modifiers released on connect and on drop, so a run never starts or ends
// with one held. A modifier the user is physically holding may desync until
// it is tapped again.
#[cfg(feature = "x11")]
pub(crate) const COMMON_MODIFIER_KEYCODES: [u32; 6] = [
    crate::keyboard::KEY_LEFTSHIFT,
    crate::keyboard::KEY_RIGHTSHIFT,
    crate::keyboard::KEY_LEFTCTRL,
    crate::keyboard::KEY_RIGHTCTRL,
    crate::keyboard::KEY_LEFTALT,
    crate::keyboard::KEY_RIGHTALT,
];
