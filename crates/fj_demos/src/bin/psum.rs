//! Parallel sum, the C++-`std::async`-tutorial classic. Forks the right
//! half of the range, sums the left half directly, joins the fork.

use std::sync::Arc;

use clap::Parser;
use fj_core::Pool;

/// Ranges smaller than this are summed serially rather than split further.
const GRANULARITY: usize = 100;

#[derive(Parser)]
#[command(about = "Parallel sum demo")]
struct Args {
    /// Number of worker threads in the pool.
    #[arg(short = 'n', long = "threads", default_value_t = 4)]
    threads: usize,

    /// Length of the vector to sum.
    len: usize,
}

type Range = (usize, usize, Arc<[i64]>);

fn parallel_sum(pool: &Pool, (beg, end, v): Range) -> i64 {
    let len = end - beg;
    if len < GRANULARITY {
        return v[beg..end].iter().sum();
    }
    let mid = beg + len / 2;
    let right = pool.submit((mid, end, Arc::clone(&v)), parallel_sum);
    let left = parallel_sum(pool, (beg, mid, Arc::clone(&v)));
    left + right.join(pool)
}

fn main() {
    fj_demos::init_logging();
    let args = Args::parse();

    let v: Arc<[i64]> = (0..args.len).map(|i| (i % 3) as i64).collect::<Vec<_>>().into();
    let expected: i64 = v.iter().sum();

    let pool = fj_core::pool_new(args.threads).expect("failed to start pool");

    println!("starting...");
    fj_demos::benchmark("parallel sum", true, || {
        let task = pool.submit((0, args.len, Arc::clone(&v)), parallel_sum);
        let sum = task.join(&pool);
        assert_eq!(sum, expected, "result {sum} should be {expected}");
        println!("result ok.");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_sum_matches_the_spec_formula_for_v_i_mod_3() {
        let pool = fj_core::pool_new(4).unwrap();
        for len in [0usize, 1, 99, 100, 101, 1000, 12345] {
            let v: Arc<[i64]> = (0..len).map(|i| (i % 3) as i64).collect::<Vec<_>>().into();
            let expected: i64 = v.iter().sum();
            let task = pool.submit((0, len, Arc::clone(&v)), parallel_sum);
            assert_eq!(task.join(&pool), expected, "mismatch for len={len}");
        }
    }
}
