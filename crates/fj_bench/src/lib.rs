//! Wall-clock and OS resource-usage benchmarking for `fj_demos` drivers.
//!
//! Mirrors the measurement envelope the original C harness wrapped each demo
//! in: a `getrusage`-based before/after diff (user time, system time,
//! voluntary/involuntary context switches) plus a wall-clock diff, written
//! as a small fixed-point JSON document a separate results-collection step
//! can pick up.

use std::fmt;
use std::fs::File;
use std::io::{self, Write as _};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Default)]
struct RusageSnapshot {
    utime: Duration,
    stime: Duration,
    nvcsw: i64,
    nivcsw: i64,
}

#[cfg(unix)]
fn snapshot_rusage() -> RusageSnapshot {
    // SAFETY: `usage` is a plain POD struct the kernel fills in; `RUSAGE_SELF`
    // requests stats for the calling process (and all its threads).
    let usage = unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
            log::warn!("getrusage failed: {}", io::Error::last_os_error());
        }
        usage
    };
    RusageSnapshot {
        utime: Duration::new(usage.ru_utime.tv_sec as u64, usage.ru_utime.tv_usec as u32 * 1000),
        stime: Duration::new(usage.ru_stime.tv_sec as u64, usage.ru_stime.tv_usec as u32 * 1000),
        nvcsw: usage.ru_nvcsw as i64,
        nivcsw: usage.ru_nivcsw as i64,
    }
}

#[cfg(not(unix))]
fn snapshot_rusage() -> RusageSnapshot {
    log::warn!("resource-usage accounting is only implemented for unix targets; reporting zeros");
    RusageSnapshot::default()
}

#[cfg(unix)]
fn parent_pid() -> i32 {
    // SAFETY: `getppid` takes no arguments and cannot fail.
    unsafe { libc::getppid() }
}

#[cfg(not(unix))]
fn parent_pid() -> u32 {
    log::warn!("no parent-pid query on this target; using the current process id instead");
    std::process::id()
}

/// An in-flight measurement started by [`start_benchmark`].
pub struct BenchmarkRun {
    rusage_start: RusageSnapshot,
    wall_start: Instant,
}

/// The user/system time, context-switch counts, and wall-clock elapsed
/// between a [`start_benchmark`]/[`stop_benchmark`] pair.
#[derive(Clone, Copy, Debug)]
pub struct BenchmarkResult {
    pub utime: Duration,
    pub stime: Duration,
    pub nvcsw: i64,
    pub nivcsw: i64,
    pub realtime: Duration,
}

/// Snapshot rusage and the wall clock. Pair with [`stop_benchmark`].
pub fn start_benchmark() -> BenchmarkRun {
    let rusage_start = snapshot_rusage();
    let wall_start = Instant::now();
    BenchmarkRun { rusage_start, wall_start }
}

/// Snapshot again and diff against the matching [`start_benchmark`] call.
pub fn stop_benchmark(run: BenchmarkRun) -> BenchmarkResult {
    let realtime = run.wall_start.elapsed();
    let rusage_end = snapshot_rusage();
    BenchmarkResult {
        utime: rusage_end.utime.saturating_sub(run.rusage_start.utime),
        stime: rusage_end.stime.saturating_sub(run.rusage_start.stime),
        nvcsw: rusage_end.nvcsw - run.rusage_start.nvcsw,
        nivcsw: rusage_end.nivcsw - run.rusage_start.nivcsw,
        realtime,
    }
}

struct FixedPointSeconds(Duration);

impl fmt::Display for FixedPointSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0.as_secs(), self.0.subsec_micros())
    }
}

impl BenchmarkResult {
    fn write_json(&self, out: &mut impl io::Write) -> io::Result<()> {
        write!(
            out,
            "{{\"ru_utime\" : {}, \"ru_stime\" : {}, \"ru_nvcsw\" : {}, \"ru_nivcsw\" : {}, \"realtime\" : {}}}",
            FixedPointSeconds(self.utime),
            FixedPointSeconds(self.stime),
            self.nvcsw,
            self.nivcsw,
            FixedPointSeconds(self.realtime),
        )
    }

    /// Human-readable rendering, one stat per line.
    pub fn write_human(&self, out: &mut impl io::Write) -> io::Result<()> {
        writeln!(out, "user time: {}s", FixedPointSeconds(self.utime))?;
        writeln!(out, "system time: {}s", FixedPointSeconds(self.stime))?;
        writeln!(out, "real time: {}s", FixedPointSeconds(self.realtime))
    }
}

/// Write `runresult.<parent pid>.json` in the current directory, matching
/// the schema a separate benchmark-collection step expects. Returns the path
/// written.
pub fn report_benchmark_results(result: &BenchmarkResult) -> io::Result<PathBuf> {
    let path = PathBuf::from(format!("runresult.{}.json", parent_pid()));
    let mut file = File::create(&path)?;
    result.write_json(&mut file)?;
    Ok(path)
}

/// Render `result` to `out` for a human reading the terminal.
pub fn report_benchmark_results_to_human(out: &mut impl io::Write, result: &BenchmarkResult) -> io::Result<()> {
    result.write_human(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_produces_a_non_negative_result() {
        let run = start_benchmark();
        std::hint::black_box((0..1_000_000u64).sum::<u64>());
        let result = stop_benchmark(run);
        assert!(result.realtime > Duration::ZERO);
        assert!(result.utime >= Duration::ZERO);
        assert!(result.stime >= Duration::ZERO);
    }

    #[test]
    fn json_report_matches_the_expected_shape() {
        let result = BenchmarkResult {
            utime: Duration::new(1, 500_000),
            stime: Duration::new(0, 250_000),
            nvcsw: 3,
            nivcsw: 7,
            realtime: Duration::new(2, 0),
        };
        let mut buf = Vec::new();
        result.write_json(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "{\"ru_utime\" : 1.000500, \"ru_stime\" : 0.000250, \"ru_nvcsw\" : 3, \"ru_nivcsw\" : 7, \"realtime\" : 2.000000}"
        );
    }

    #[test]
    fn human_report_prints_three_lines() {
        let result = BenchmarkResult {
            utime: Duration::new(0, 0),
            stime: Duration::new(0, 0),
            nvcsw: 0,
            nivcsw: 0,
            realtime: Duration::new(1, 0),
        };
        let mut buf = Vec::new();
        result.write_human(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
