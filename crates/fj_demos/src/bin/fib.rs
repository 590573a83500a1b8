//! Parallel Fibonacci: a toy driver for seeing how well the scheduler copes
//! with extremely fine-grained tasks. Forks the right half, recurses into
//! the left half directly, joins the fork.

use clap::Parser;
use fj_core::Pool;

#[derive(Parser)]
#[command(about = "Parallel fibonacci demo")]
struct Args {
    /// Number of worker threads in the pool.
    #[arg(short = 'n', long = "threads", default_value_t = 4)]
    threads: usize,

    /// Which fibonacci number to compute (F(0) = F(1) = 1).
    n: u32,
}

fn fibonacci(pool: &Pool, n: u32) -> u64 {
    if n <= 1 {
        return 1;
    }
    let right = pool.submit(n - 2, fibonacci);
    let left = fibonacci(pool, n - 1);
    left + right.join(pool)
}

fn expected_fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 2..=n {
        let c = a + b;
        a = b;
        b = c;
    }
    b
}

fn main() {
    fj_demos::init_logging();
    let args = Args::parse();

    let expected = expected_fibonacci(args.n);
    let pool = fj_core::pool_new(args.threads).expect("failed to start pool");

    println!("starting...");
    fj_demos::benchmark("fibonacci parallel", true, || {
        let task = pool.submit(args.n, fibonacci);
        let value = task.join(&pool);
        assert_eq!(value, expected, "result {value} should be {expected}");
        println!("result ok.");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_fibonacci_matches_classical_convention() {
        assert_eq!(expected_fibonacci(0), 1);
        assert_eq!(expected_fibonacci(1), 1);
        assert_eq!(expected_fibonacci(20), 10946);
    }

    #[test]
    fn parallel_fibonacci_matches_the_dp_table() {
        let pool = fj_core::pool_new(4).unwrap();
        for n in 0..15 {
            let task = pool.submit(n, fibonacci);
            assert_eq!(task.join(&pool), expected_fibonacci(n));
        }
    }
}
