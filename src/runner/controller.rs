//! Render loop controller.
//!
//! The controller owns the display and drives the run lifecycle. It never
//! blocks on a reader: finished reader threads are collected with
//! `is_finished` and joined only once they are done.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cancel::CancelFlag;
use crate::extract::Patterns;
use crate::render::{Renderer, Terminal};
use crate::source::LineSource;
use crate::state::SharedState;

use super::reader::{spawn_latency_reader, spawn_progress_reader, ReaderHandle, ReaderRole};
use super::{Phase, RunError, RunOptions, RunResult, StopReason};

/// Extra time readers get to notice cancellation, on top of two poll intervals.
const JOIN_SLACK: Duration = Duration::from_millis(50);
/// Poll step while waiting for readers to exit.
const JOIN_STEP: Duration = Duration::from_millis(5);

struct TrackedReader {
    role: ReaderRole,
    handle: Option<ReaderHandle>,
}

impl TrackedReader {
    fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

/// Drives one monitoring run.
pub struct Controller<T: Terminal, E: Write> {
    options: RunOptions,
    patterns: Arc<Patterns>,
    state: Arc<SharedState>,
    renderer: Renderer<T>,
    errors: E,
    cancel: CancelFlag,
    interrupted: Arc<AtomicBool>,
    phase: Phase,
    readers: Vec<TrackedReader>,
    progress_done: bool,
    output_closed: bool,
}

impl<T: Terminal, E: Write> Controller<T, E> {
    /// Create a controller painting on `term` and reporting reader errors to
    /// `errors`.
    pub fn new(options: RunOptions, patterns: Patterns, term: T, errors: E) -> Self {
        Self {
            options,
            patterns: Arc::new(patterns),
            state: Arc::new(SharedState::new()),
            renderer: Renderer::new(term),
            errors,
            cancel: CancelFlag::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
            phase: Phase::Starting,
            readers: Vec::new(),
            progress_done: false,
            output_closed: false,
        }
    }

    /// Get the interrupt flag for external signaling.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The shared monitor state.
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// The renderer.
    pub fn renderer(&self) -> &Renderer<T> {
        &self.renderer
    }

    /// Where reader errors were reported.
    pub fn errors(&self) -> &E {
        &self.errors
    }

    /// Run until the exit policy, an interrupt, or an output failure stops
    /// the display.
    pub fn run(&mut self, progress: Box<dyn LineSource>) -> Result<RunResult, RunError> {
        if self.phase != Phase::Starting {
            return Err(RunError::AlreadyRun);
        }
        let start_time = Instant::now();

        self.spawn_readers(progress)?;
        self.set_phase(Phase::Running);

        let stop_reason = loop {
            if self.interrupted.load(Ordering::SeqCst) {
                break StopReason::Interrupted;
            }

            self.collect_readers();

            if let Err(e) = self.render_pending() {
                debug!(error = %e, "display write failed");
                self.output_closed = true;
                break StopReason::OutputClosed;
            }

            if let Some(reason) = self.exit_reason() {
                break reason;
            }

            thread::sleep(self.options.tick);
        };

        debug!(reason = %stop_reason, "stopping");
        self.drain();

        Ok(RunResult {
            stop_reason,
            frames: self.renderer.frames(),
            duration: start_time.elapsed(),
            final_state: self.state.snapshot(),
        })
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase change");
        self.phase = phase;
    }

    fn spawn_readers(&mut self, progress: Box<dyn LineSource>) -> Result<(), RunError> {
        let handle = spawn_progress_reader(
            progress,
            Arc::clone(&self.patterns),
            Arc::clone(&self.state),
            self.cancel.clone(),
        )
        .map_err(|source| RunError::Spawn {
            role: ReaderRole::Progress,
            source,
        })?;
        self.readers.push(TrackedReader {
            role: ReaderRole::Progress,
            handle: Some(handle),
        });

        if let Some(path) = self.options.latency_log.clone() {
            let spawned = spawn_latency_reader(
                &path,
                self.options.follow,
                Arc::clone(&self.patterns),
                Arc::clone(&self.state),
                self.cancel.clone(),
            );
            match spawned {
                Ok(handle) => self.readers.push(TrackedReader {
                    role: ReaderRole::Latency,
                    handle: Some(handle),
                }),
                Err(source) => {
                    self.cancel.cancel();
                    return Err(RunError::Spawn {
                        role: ReaderRole::Latency,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Join readers that have finished and report their errors once.
    fn collect_readers(&mut self) {
        let mut failures = Vec::new();
        for reader in &mut self.readers {
            let finished = reader.handle.as_ref().is_some_and(|h| h.is_finished());
            if !finished {
                continue;
            }
            let Some(handle) = reader.handle.take() else {
                continue;
            };
            if reader.role == ReaderRole::Progress {
                self.progress_done = true;
            }
            match handle.join() {
                Ok(Ok(summary)) => {
                    debug!(
                        role = %reader.role,
                        lines = summary.lines,
                        records = summary.records,
                        "reader finished"
                    );
                }
                Ok(Err(e)) => failures.push(e.to_string()),
                Err(_) => failures.push(format!("{} reader panicked", reader.role)),
            }
        }

        if failures.is_empty() {
            return;
        }
        // Errors share the screen with the painted block; step below it so
        // the next redraw starts a new block under the message.
        if !self.output_closed {
            if let Err(e) = self.renderer.finish() {
                debug!(error = %e, "could not end display block");
            }
        }
        for message in failures {
            debug!(%message, "reader stopped");
            if let Err(e) = writeln!(self.errors, "error: {message}") {
                debug!(error = %e, "could not report reader error");
            }
        }
    }

    /// Repaint if the state changed and has something to show.
    fn render_pending(&mut self) -> io::Result<()> {
        let Some(snapshot) = self.state.take_snapshot() else {
            return Ok(());
        };
        let Some(lines) =
            self.options
                .layout
                .lines(&snapshot, self.options.bar_width, Instant::now())
        else {
            return Ok(());
        };
        self.renderer.draw(&lines)
    }

    fn exit_reason(&self) -> Option<StopReason> {
        if self.options.exit_on_done {
            if let Some(at) = self.state.completed_at() {
                return (at.elapsed() >= self.options.grace).then_some(StopReason::Completed);
            }
        }
        self.progress_done.then_some(StopReason::InputExhausted)
    }

    fn drain(&mut self) {
        self.set_phase(Phase::Draining);
        self.cancel.cancel();

        if !self.output_closed {
            let flushed = self
                .render_pending()
                .and_then(|()| self.renderer.finish());
            if let Err(e) = flushed {
                debug!(error = %e, "final flush failed");
            }
        }

        let deadline = Instant::now() + self.options.follow.poll_interval * 2 + JOIN_SLACK;
        loop {
            self.collect_readers();
            if !self.readers.iter().any(TrackedReader::is_running) || Instant::now() >= deadline {
                break;
            }
            thread::sleep(JOIN_STEP);
        }
        for reader in self.readers.iter_mut().filter(|r| r.is_running()) {
            // Still blocked in a read (typically stdin); it ends with the process.
            debug!(role = %reader.role, "detaching reader");
            reader.handle = None;
        }

        self.set_phase(Phase::Stopped);
    }
}

/// Install a Ctrl+C handler that sets `flag`.
///
/// Failure is reported as a warning and the run continues without a handler.
pub fn install_interrupt_handler(flag: Arc<AtomicBool>) {
    let handler_result = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    });

    if let Err(e) = handler_result {
        eprintln!("\x1b[33mWarning:\x1b[0m Could not set up Ctrl+C handler: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{BufferTerminal, Layout};
    use crate::source::{FollowOptions, SourceError, StreamSource};
    use std::collections::VecDeque;
    use std::fs::{self, OpenOptions};
    use std::io::Cursor;
    use tempfile::TempDir;

    const FAST_TICK: Duration = Duration::from_millis(10);

    /// Yields fixed lines, then either ends, fails, or blocks until cancelled.
    struct ScriptedSource {
        lines: VecDeque<String>,
        hold_open: bool,
        fail_after: Option<Duration>,
    }

    impl ScriptedSource {
        fn new(lines: &[&str], hold_open: bool) -> Box<dyn LineSource> {
            Box::new(Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                hold_open,
                fail_after: None,
            })
        }

        /// Yields `lines`, then fails with a read error after `delay`.
        fn failing(lines: &[&str], delay: Duration) -> Box<dyn LineSource> {
            Box::new(Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                hold_open: false,
                fail_after: Some(delay),
            })
        }
    }

    impl LineSource for ScriptedSource {
        fn next_line(&mut self, cancel: &CancelFlag) -> Result<Option<String>, SourceError> {
            if let Some(line) = self.lines.pop_front() {
                return Ok(Some(line));
            }
            if let Some(delay) = self.fail_after {
                thread::sleep(delay);
                return Err(SourceError::Read(io::Error::other("disk gone")));
            }
            while self.hold_open && !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(None)
        }
    }

    /// A display whose writes always fail, like a closed pipe.
    struct BrokenTerminal;

    impl Write for BrokenTerminal {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Terminal for BrokenTerminal {
        fn is_tty(&self) -> bool {
            false
        }

        fn width(&self) -> u16 {
            80
        }
    }

    fn stream(text: &str) -> Box<dyn LineSource> {
        Box::new(StreamSource::new(Cursor::new(text.as_bytes().to_vec())))
    }

    fn options(layout: Layout) -> RunOptions {
        RunOptions::new(layout).with_tick(FAST_TICK).with_bar_width(10)
    }

    const PROGRESS: &str = "\
00:00:01.000 INFO total size = 10, in queue = 6, running = 2
00:00:02.000 INFO total size = 10, in queue = 3, running = 2
00:00:03.000 INFO total size = 10, in queue = 0, running = 1
";

    #[test]
    fn test_track_to_end_of_input() {
        let term = BufferTerminal::piped();
        let mut controller = Controller::new(
            options(Layout::SingleLine),
            Patterns::new(),
            term.clone(),
            Vec::new(),
        );

        let result = controller.run(stream(PROGRESS)).unwrap();
        assert_eq!(result.stop_reason, StopReason::InputExhausted);
        assert_eq!(controller.phase(), Phase::Stopped);

        let out = term.contents();
        let last = out.lines().last().unwrap();
        assert!(last.contains("completed=10/10"), "{last}");
        assert!(last.contains("100.00%"), "{last}");
        assert!(last.contains("queue=0  running=0"), "{last}");
        assert!(controller.errors().is_empty());
    }

    #[test]
    fn test_piped_frames_append_one_row_per_line() {
        let term = BufferTerminal::piped();
        let mut controller = Controller::new(
            options(Layout::TwoLine),
            Patterns::new(),
            term.clone(),
            Vec::new(),
        );
        let result = controller.run(stream(PROGRESS)).unwrap();

        assert!(result.frames >= 1);
        assert_eq!(term.contents().lines().count(), result.frames * 2);
        assert!(!term.contents().contains('\x1b'));
    }

    #[test]
    fn test_missing_latency_log_reported_once() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("latency.log");
        let term = BufferTerminal::piped();
        let mut controller = Controller::new(
            options(Layout::TwoLine).with_latency_log(Some(missing)),
            Patterns::new(),
            term.clone(),
            Vec::new(),
        );

        let result = controller.run(stream(PROGRESS)).unwrap();
        assert_eq!(result.stop_reason, StopReason::InputExhausted);

        let errors = String::from_utf8(controller.errors().clone()).unwrap();
        assert_eq!(errors.matches("latency log not found").count(), 1);
        assert!(errors.starts_with("error: latency log not found: "));

        let out = term.contents();
        assert!(out.contains("completed=10/10"));
        assert!(out.contains("latency (microseconds): count=0"));
    }

    #[test]
    fn test_completion_marker_stops_with_exit_on_done() {
        let term = BufferTerminal::piped();
        let mut controller = Controller::new(
            options(Layout::SingleLine).with_exit_on_done(true, Duration::ZERO),
            Patterns::new(),
            term.clone(),
            Vec::new(),
        );
        let source = ScriptedSource::new(
            &[
                "00:00:01.000 INFO total size = 4, in queue = 2, running = 1",
                "00:00:05.250 INFO Billings calculated in 4.2s",
            ],
            true,
        );

        let result = controller.run(source).unwrap();
        assert_eq!(result.stop_reason, StopReason::Completed);

        let last = term.contents().lines().last().unwrap().to_string();
        assert!(last.starts_with("00:00:05.250"), "{last}");
        assert!(last.contains("completed=4/4"), "{last}");
        assert_eq!(
            result
                .final_state
                .completion
                .and_then(|c| c.log_time)
                .as_deref(),
            Some("00:00:05.250")
        );
    }

    #[test]
    fn test_grace_period_delays_exit() {
        let grace = Duration::from_millis(150);
        let mut controller = Controller::new(
            options(Layout::TwoLine).with_exit_on_done(true, grace),
            Patterns::new(),
            BufferTerminal::piped(),
            Vec::new(),
        );
        let source = ScriptedSource::new(&["00:00:05.250 Billings calculated in 1s"], true);

        let result = controller.run(source).unwrap();
        assert_eq!(result.stop_reason, StopReason::Completed);
        assert!(result.duration >= grace);
    }

    #[test]
    fn test_latency_after_completion_rendered_during_grace() {
        let temp = TempDir::new().unwrap();
        let latency = temp.path().join("latency.log");
        fs::write(&latency, "").unwrap();

        let term = BufferTerminal::piped();
        let mut controller = Controller::new(
            options(Layout::TwoLine)
                .with_exit_on_done(true, Duration::from_millis(400))
                .with_latency_log(Some(latency.clone()))
                .with_follow(FollowOptions {
                    poll_interval: Duration::from_millis(20),
                    ..FollowOptions::default()
                }),
            Patterns::new(),
            term.clone(),
            Vec::new(),
        );
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let mut file = OpenOptions::new().append(true).open(&latency).unwrap();
            file.write_all(b"a took 5us\nb took 3us\nc took 9us\n").unwrap();
        });

        let source = ScriptedSource::new(&["00:00:05.250 Billings calculated in 1s"], true);
        let result = controller.run(source).unwrap();
        writer.join().unwrap();

        assert_eq!(result.stop_reason, StopReason::Completed);
        assert_eq!(result.final_state.latency.count, 3);
        let out = term.contents();
        let last = out.lines().last().unwrap();
        assert!(last.contains("count=3"), "{last}");
        assert!(last.contains("min=3"), "{last}");
        assert!(controller.errors().is_empty());
    }

    #[test]
    fn test_reader_error_starts_below_painted_block() {
        let term = BufferTerminal::tty(80);
        let mut controller = Controller::new(
            options(Layout::TwoLine),
            Patterns::new(),
            term.clone(),
            term.clone(),
        );
        let source = ScriptedSource::failing(
            &["00:00:01.000 total size = 8, in queue = 4, running = 2"],
            Duration::from_millis(100),
        );

        let result = controller.run(source).unwrap();
        assert_eq!(result.stop_reason, StopReason::InputExhausted);

        let out = term.contents();
        assert!(
            out.ends_with("count=0\nerror: progress log: read failed: disk gone\n"),
            "{out:?}"
        );
        assert_eq!(out.matches("error:").count(), 1);
    }

    #[test]
    fn test_interrupt_drains_and_stops() {
        let term = BufferTerminal::tty(80);
        let mut controller = Controller::new(
            options(Layout::SingleLine),
            Patterns::new(),
            term.clone(),
            Vec::new(),
        );
        let flag = controller.interrupt_flag();
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::SeqCst);
        });

        let source = ScriptedSource::new(
            &["00:00:01.000 total size = 8, in queue = 4, running = 2"],
            true,
        );
        let result = controller.run(source).unwrap();
        trigger.join().unwrap();

        assert_eq!(result.stop_reason, StopReason::Interrupted);
        assert_eq!(controller.phase(), Phase::Stopped);
        // Interrupted before the end of input, so no completion snap.
        assert!(result.final_state.completion.is_none());
        let out = term.contents();
        assert!(out.contains("completed=2/8"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_end_of_input_without_progress_renders_once() {
        let term = BufferTerminal::tty(80);
        let mut controller = Controller::new(
            options(Layout::SingleLine),
            Patterns::new(),
            term.clone(),
            Vec::new(),
        );
        let result = controller.run(stream("hello\nworld\n")).unwrap();

        // End of input still counts as completion, so one frame appears.
        assert_eq!(result.frames, 1);
        assert!(term.contents().contains("completed=?/?"));
    }

    #[test]
    fn test_output_failure_stops_run() {
        let mut controller = Controller::new(
            options(Layout::SingleLine),
            Patterns::new(),
            BrokenTerminal,
            Vec::new(),
        );
        let source = ScriptedSource::new(
            &["00:00:01.000 total size = 8, in queue = 4, running = 2"],
            true,
        );
        let result = controller.run(source).unwrap();
        assert_eq!(result.stop_reason, StopReason::OutputClosed);
        assert_eq!(result.frames, 0);
    }

    #[test]
    fn test_run_twice_fails() {
        let mut controller = Controller::new(
            options(Layout::SingleLine),
            Patterns::new(),
            BufferTerminal::piped(),
            Vec::new(),
        );
        controller.run(stream("")).unwrap();
        assert!(matches!(
            controller.run(stream("")),
            Err(RunError::AlreadyRun)
        ));
    }
}
