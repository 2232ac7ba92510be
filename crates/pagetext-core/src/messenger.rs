//! User-facing notification hook.

/// Receives one message per reported outcome.
pub trait Messenger: Send + Sync {
    fn notify(&self, message: &str, is_error: bool);
}

impl<F> Messenger for F
where
    F: Fn(&str, bool) + Send + Sync,
{
    fn notify(&self, message: &str, is_error: bool) {
        self(message, is_error)
    }
}

/// Fallback messenger: prints straight to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertMessenger;

impl Messenger for AlertMessenger {
    fn notify(&self, message: &str, is_error: bool) {
        if is_error {
            eprintln!("error: {message}");
        } else {
            eprintln!("{message}");
        }
    }
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentMessenger;

impl Messenger for SilentMessenger {
    fn notify(&self, _message: &str, _is_error: bool) {}
}
