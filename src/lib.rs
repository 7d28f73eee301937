pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod keyboard;
pub mod keylog;
pub mod logging;
pub mod mistake;
pub mod playback;
pub mod preprocess;
pub mod scheduler;
pub mod sim;
pub mod timing;

pub use engine::{SessionState, SessionSummary, StatusSnapshot, Typist};
