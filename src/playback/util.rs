use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};

fn sleep_interruptible(stop: &AtomicBool, ms: u64) {
    let mut remaining = ms;
    while remaining > 0 {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let step = remaining.min(50);
        std::thread::sleep(Duration::from_millis(step));
        remaining -= step;
    }
}

/// Count down on stderr so the user can focus the target window.
pub fn countdown(stop: &AtomicBool, secs: u64) -> Result<()> {
    if secs == 0 {
        return Ok(());
    }

    eprintln!("Focus the target window. Typing starts in {secs}s...");
    for remaining in (1..=secs).rev() {
        if stop.load(Ordering::SeqCst) {
            return Err(anyhow!("aborted"));
        }
        eprintln!("{remaining}...");
        sleep_interruptible(stop, 1000);
    }
    if stop.load(Ordering::SeqCst) {
        return Err(anyhow!("aborted"));
    }
    Ok(())
}
