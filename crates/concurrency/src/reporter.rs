//! Periodic throughput reporter
//!
//! A dedicated thread samples the [`ThroughputCounter`] once per interval and
//! writes one `"<n> events/sec"` line to its sink. Ticks follow a fixed-rate
//! schedule: each deadline is the previous deadline plus the interval, so a
//! slow write does not shift every later window.

use crate::counter::ThroughputCounter;
use parking_lot::{Condvar, Mutex};
use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::warn;

/// Output sink for report lines
pub type ReportSink = Box<dyn Write + Send>;

struct ReporterInner {
    stopped: Mutex<bool>,
    stop_cond: Condvar,
}

/// Handle to the running reporter thread
pub struct ThroughputReporter {
    inner: Arc<ReporterInner>,
    handle: Option<JoinHandle<u64>>,
}

impl ThroughputReporter {
    /// Start reporting `counter` every `interval` into `sink`
    ///
    /// # Errors
    ///
    /// Returns an error if the reporter thread cannot be spawned.
    pub fn spawn(
        counter: Arc<ThroughputCounter>,
        interval: Duration,
        sink: ReportSink,
    ) -> std::io::Result<Self> {
        let inner = Arc::new(ReporterInner {
            stopped: Mutex::new(false),
            stop_cond: Condvar::new(),
        });
        let thread_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("eventbench-reporter".to_string())
            .spawn(move || report_loop(&thread_inner, &counter, interval, sink))?;
        Ok(Self {
            inner,
            handle: Some(handle),
        })
    }

    /// Stop the reporter and wait for its thread
    ///
    /// Returns the number of lines written. Operations counted after the last
    /// tick stay in the counter's window.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        {
            let mut stopped = self.inner.stopped.lock();
            *stopped = true;
            self.inner.stop_cond.notify_all();
        }
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for ThroughputReporter {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

fn report_loop(
    inner: &ReporterInner,
    counter: &ThroughputCounter,
    interval: Duration,
    mut sink: ReportSink,
) -> u64 {
    let mut lines = 0u64;
    let mut deadline = Instant::now() + interval;
    loop {
        {
            let mut stopped = inner.stopped.lock();
            while !*stopped {
                if inner.stop_cond.wait_until(&mut stopped, deadline).timed_out() {
                    break;
                }
            }
            if *stopped {
                return lines;
            }
        }

        let counted = counter.sample_and_reset();
        if let Err(e) = writeln!(sink, "{} events/sec", counted).and_then(|_| sink.flush()) {
            warn!(target: "eventbench::run", error = %e, "failed to write throughput report");
        } else {
            lines += 1;
        }

        deadline += interval;
        // Fell more than a full interval behind: skip the missed ticks
        let now = Instant::now();
        if deadline + interval < now {
            deadline = now + interval;
        }
    }
}
