//! Shared plumbing for the demo binaries: logging setup and the
//! benchmark-and-report wrapper every driver runs its timed section through.

use std::io::Write as _;

/// Initialize `env_logger` from `RUST_LOG`, defaulting to `warn`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).try_init();
}

/// Run `f` inside a [`fj_bench`] measurement, print the human-readable
/// timings, and, if `report` is set, write the `runresult.<ppid>.json` file.
pub fn benchmark(name: &str, report: bool, f: impl FnOnce()) {
    let run = fj_bench::start_benchmark();
    f();
    let result = fj_bench::stop_benchmark(run);

    if report {
        match fj_bench::report_benchmark_results(&result) {
            Ok(path) => log::info!("wrote benchmark results to {}", path.display()),
            Err(err) => log::warn!("failed to write benchmark results: {err}"),
        }
    }

    println!("{name} result ok. Timings follow");
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    let _ = fj_bench::report_benchmark_results_to_human(&mut lock, &result);
    let _ = lock.flush();
}
