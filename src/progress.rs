//! Decorative progress spinner.
//!
//! Runs on its own thread and only ever draws to stderr. It carries no
//! state the run depends on; [`Spinner::finish`] (or drop) stops and joins
//! the thread and clears the line, so callers finish it before printing a
//! result or an error. Log events written through [`log_writer`] erase a
//! drawn frame first, so they never share a line with the spinner.
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const TICK: Duration = Duration::from_millis(120);
const CLEAR_LINE: &[u8] = b"\r\x1b[K";

/// Set while a spinner frame is on the current stderr line. Only changed
/// with the stderr lock held.
static FRAME_DRAWN: AtomicBool = AtomicBool::new(false);

pub struct Spinner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Start a spinner for `label` when stderr is a terminal and `enabled`.
    pub fn start(label: &str, enabled: bool) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        if !enabled || !io::stderr().is_terminal() {
            return Self { stop, handle: None };
        }
        let label = label.to_string();
        let flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            let mut frame = 0usize;
            while !flag.load(Ordering::Acquire) {
                let mut stderr = io::stderr().lock();
                let _ = write!(stderr, "\r{label} {}", FRAMES[frame % FRAMES.len()]);
                let _ = stderr.flush();
                FRAME_DRAWN.store(true, Ordering::Release);
                drop(stderr);
                frame = frame.wrapping_add(1);
                std::thread::sleep(TICK);
            }
            let mut stderr = io::stderr().lock();
            if FRAME_DRAWN.swap(false, Ordering::AcqRel) {
                let _ = stderr.write_all(CLEAR_LINE);
                let _ = stderr.flush();
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the spinner and wait until its line is cleared.
    pub fn finish(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Stderr handle for log output.
pub struct LogWriter;

/// `MakeWriter` for the stderr log layer.
pub fn log_writer() -> LogWriter {
    LogWriter
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut stderr = io::stderr().lock();
        write_clearing_frame(&mut stderr, &FRAME_DRAWN, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn write_clearing_frame(out: &mut impl Write, drawn: &AtomicBool, buf: &[u8]) -> io::Result<usize> {
    if drawn.swap(false, Ordering::AcqRel) {
        out.write_all(CLEAR_LINE)?;
    }
    out.write(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_spinner_spawns_nothing() {
        let spinner = Spinner::start("installing", false);
        assert!(!spinner.is_running());
        spinner.finish();
    }

    #[test]
    fn finish_joins_a_running_spinner() {
        let spinner = Spinner::start("installing", true);
        // Under a test harness stderr is usually not a terminal; either way
        // finish must return with the thread gone.
        spinner.finish();
    }

    #[test]
    fn log_output_erases_a_drawn_frame_once() {
        let drawn = AtomicBool::new(true);
        let mut out = Vec::new();

        write_clearing_frame(&mut out, &drawn, b"WARN proposal creation failed\n").expect("write");
        write_clearing_frame(&mut out, &drawn, b"INFO proposal created\n").expect("write");

        assert!(!drawn.load(Ordering::Acquire));
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "\r\x1b[KWARN proposal creation failed\nINFO proposal created\n"
        );
    }

    #[test]
    fn log_output_without_a_frame_is_untouched() {
        let drawn = AtomicBool::new(false);
        let mut out = Vec::new();
        write_clearing_frame(&mut out, &drawn, b"INFO install run starting\n").expect("write");
        assert_eq!(out, b"INFO install run starting\n");
    }
}
