//! Cooperative SIGINT/SIGTERM handling.
//!
//! The first signal sets a flag the controller checks between steps; a
//! second one exits immediately with status 130.
use anyhow::Result;
use std::sync::atomic::AtomicBool;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

pub fn flag() -> &'static AtomicBool {
    &INTERRUPTED
}

#[cfg(unix)]
extern "C" fn handle_signal(_signal: libc::c_int) {
    if INTERRUPTED.swap(true, std::sync::atomic::Ordering::SeqCst) {
        // Only async-signal-safe calls here.
        unsafe { libc::_exit(130) };
    }
}

#[cfg(unix)]
pub fn install() -> Result<()> {
    let handler = handle_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only touches an atomic and calls `_exit`.
        let previous = unsafe { libc::signal(signal, handler) };
        if previous == libc::SIG_ERR {
            return Err(anyhow::anyhow!(
                "install handler for signal {signal}: {}",
                std::io::Error::last_os_error()
            ));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install() -> Result<()> {
    tracing::warn!("interrupt handling unavailable on this platform; Ctrl-C stops immediately");
    Ok(())
}
