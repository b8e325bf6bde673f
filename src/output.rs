//! Run reporting on stderr.
//!
//! stdout is reserved for the command's JSON envelope, so everything a
//! human watches during a run goes through here: one-line status
//! messages and the indexing progress bar. A process-wide quiet flag
//! silences both; the envelope is never affected.

use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

static QUIET: AtomicBool = AtomicBool::new(false);

/// Suppress status lines and progress bars for this process.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::SeqCst);
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::SeqCst)
}

/// Print a one-line status message to stderr unless quiet.
pub fn status(message: impl AsRef<str>) {
    if !is_quiet() {
        eprintln!("{}", message.as_ref());
    }
}

/// Progress bar over `len` work items, hidden entirely in quiet mode.
///
/// The caller sets the current file as the bar message and ticks it per
/// item; finished bars are cleared so they leave no residue on stderr.
pub fn file_bar(len: usize) -> ProgressBar {
    if is_quiet() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .expect("valid progress template")
            .progress_chars("=> "),
    );
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_flag_roundtrip() {
        set_quiet(false);
        assert!(!is_quiet());

        set_quiet(true);
        assert!(is_quiet());

        set_quiet(false);
    }

    #[test]
    fn test_status_does_not_panic_in_either_mode() {
        set_quiet(false);
        status("visible line");
        status(format!("formatted {}", 1));

        set_quiet(true);
        status("suppressed line");

        set_quiet(false);
    }

    #[test]
    fn test_file_bar_hidden_when_quiet() {
        set_quiet(true);
        let bar = file_bar(10);
        assert!(bar.is_hidden());
        set_quiet(false);

        let bar = file_bar(10);
        bar.inc(3);
        assert_eq!(bar.position(), 3);
        bar.finish_and_clear();
    }
}
