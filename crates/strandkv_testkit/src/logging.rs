//! Log setup and capture for tests.

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Installs a global subscriber that honours `RUST_LOG` and writes through
/// the test harness. Safe to call from every test; only the first call
/// installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
struct BufMakeWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for BufMakeWriter {
    type Writer = BufWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufWriter(Arc::clone(&self.0))
    }
}

struct BufWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for BufWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a thread-local subscriber and returns what it logged at
/// `TRACE` and above.
///
/// Only events emitted on the calling thread are captured; work done on
/// the drain thread is not.
pub fn with_log_capture<F, R>(f: F) -> (R, String)
where
    F: FnOnce() -> R,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(BufMakeWriter(Arc::clone(&buf)))
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let bytes = buf.lock().clone();
    (result, String::from_utf8_lossy(&bytes).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_events_of_the_closure() {
        let (value, logs) = with_log_capture(|| {
            tracing::warn!("inside");
            7
        });
        assert_eq!(value, 7);
        assert!(logs.contains("inside"));
    }

    #[test]
    fn init_is_repeatable() {
        init_test_logging();
        init_test_logging();
    }
}
