//! SIGTERM hook that asks the running loop to wind down.

use std::io;
use std::sync::OnceLock;

use cosim_core::StopToken;

/// Token set by the handler. Initialised before the handler is installed.
static SIGTERM_TOKEN: OnceLock<StopToken> = OnceLock::new();

extern "C" fn on_sigterm(_sig: libc::c_int) {
    if let Some(token) = SIGTERM_TOKEN.get() {
        token.request_stop();
    }
}

/// Installs the process-wide SIGTERM handler and returns its stop token.
///
/// Repeated calls return the same token.
///
/// # Errors
///
/// Returns the OS error if the handler cannot be installed.
#[allow(unsafe_code)]
pub fn install_sigterm_handler() -> io::Result<StopToken> {
    let token = SIGTERM_TOKEN.get_or_init(StopToken::new).clone();
    // SAFETY: the handler only performs an atomic store through a token
    // that is fully initialised before installation.
    let previous = unsafe {
        libc::signal(
            libc::SIGTERM,
            on_sigterm as *const () as libc::sighandler_t,
        )
    };
    if previous == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::install_sigterm_handler;

    #[test]
    fn repeated_installs_share_one_token() {
        let first = install_sigterm_handler().expect("SIGTERM handler installs");
        let second = install_sigterm_handler().expect("SIGTERM handler reinstalls");
        assert!(!first.is_stop_requested());
        second.request_stop();
        assert!(first.is_stop_requested());
    }
}
