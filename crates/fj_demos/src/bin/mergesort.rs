//! Parallel mergesort. Splits the vector in half, forks the left half to the
//! pool, recurses into the right half directly, then merges the two sorted
//! halves once the fork joins. Falls back to a serial insertion/merge sort
//! below the configured task-size and insertion-sort cutoffs.

use clap::Parser;
use fj_core::Pool;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_INSERTION_SORT_THRESHOLD: usize = 16;
const DEFAULT_SERIAL_MERGE_SORT_THRESHOLD: usize = 1000;
const DEFAULT_THREADS: usize = 4;

#[derive(Parser)]
#[command(about = "Parallel mergesort demo")]
struct Args {
    /// Insertion sort threshold.
    #[arg(short = 'i', long = "insertion-threshold", default_value_t = DEFAULT_INSERTION_SORT_THRESHOLD)]
    insertion_threshold: usize,

    /// Minimum task size before falling back to a serial merge sort.
    #[arg(short = 'm', long = "min-task-size", default_value_t = DEFAULT_SERIAL_MERGE_SORT_THRESHOLD)]
    min_task_size: usize,

    /// Number of worker threads in the pool.
    #[arg(short = 'n', long = "threads", default_value_t = DEFAULT_THREADS)]
    threads: usize,

    /// Also run (and time) a fully serial mergesort for comparison.
    #[arg(short = 'q', long)]
    serial: bool,

    /// Also run (and time) the standard library's sort for comparison.
    #[arg(short = 'b', long)]
    builtin: bool,

    /// Seed the random number generator.
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// Length of the vector to sort.
    len: usize,
}

fn check_sorted(a: &[i32]) -> bool {
    a.windows(2).all(|w| w[0] <= w[1])
}

fn insertion_sort(a: &mut [i32]) {
    for i in 1..a.len() {
        let t = a[i];
        let mut j = i;
        while j > 0 && t < a[j - 1] {
            a[j] = a[j - 1];
            j -= 1;
        }
        a[j] = t;
    }
}

fn merge_sorted(mut left: Vec<i32>, right: Vec<i32>) -> Vec<i32> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left_iter = left.drain(..).peekable();
    let mut right_iter = right.into_iter().peekable();
    loop {
        match (left_iter.peek(), right_iter.peek()) {
            (Some(l), Some(r)) => {
                if l <= r {
                    out.push(left_iter.next().unwrap());
                } else {
                    out.push(right_iter.next().unwrap());
                }
            }
            (Some(_), None) => out.extend(left_iter),
            (None, Some(_)) => out.extend(right_iter),
            (None, None) => break,
        }
        if left_iter.peek().is_none() || right_iter.peek().is_none() {
            out.extend(left_iter.by_ref());
            out.extend(right_iter.by_ref());
            break;
        }
    }
    out
}

fn mergesort_serial(mut v: Vec<i32>, insertion_threshold: usize) -> Vec<i32> {
    if v.len() < insertion_threshold {
        insertion_sort(&mut v);
        return v;
    }
    let mid = v.len() / 2;
    let right = v.split_off(mid);
    let left = mergesort_serial(v, insertion_threshold);
    let right = mergesort_serial(right, insertion_threshold);
    merge_sorted(left, right)
}

struct SortChunk {
    v: Vec<i32>,
    min_task_size: usize,
    insertion_threshold: usize,
}

fn mergesort_parallel(pool: &Pool, chunk: SortChunk) -> Vec<i32> {
    let SortChunk { mut v, min_task_size, insertion_threshold } = chunk;
    if v.len() <= min_task_size {
        return mergesort_serial(v, insertion_threshold);
    }
    let mid = v.len() / 2;
    let right = v.split_off(mid);

    let left_task = pool.submit(
        SortChunk { v, min_task_size, insertion_threshold },
        mergesort_parallel,
    );
    let right_sorted = mergesort_parallel(pool, SortChunk { v: right, min_task_size, insertion_threshold });
    let left_sorted = left_task.join(pool);
    merge_sorted(left_sorted, right_sorted)
}

fn main() {
    fj_demos::init_logging();
    let args = Args::parse();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let input: Vec<i32> = (0..args.len).map(|_| rng.random()).collect();

    if args.builtin {
        fj_demos::benchmark("builtin sort", false, || {
            let mut a = input.clone();
            a.sort_unstable();
            assert!(check_sorted(&a));
            println!("result ok.");
        });
    }

    if args.serial {
        fj_demos::benchmark("mergesort serial", false, || {
            let sorted = mergesort_serial(input.clone(), args.insertion_threshold);
            assert!(check_sorted(&sorted));
            println!("result ok.");
        });
    }

    println!(
        "Using {} threads, parallel/serial threshold={} insertion sort threshold={}",
        args.threads, args.min_task_size, args.insertion_threshold
    );
    let pool = fj_core::pool_new(args.threads).expect("failed to start pool");
    fj_demos::benchmark("mergesort parallel", true, || {
        let chunk = SortChunk {
            v: input.clone(),
            min_task_size: args.min_task_size,
            insertion_threshold: args.insertion_threshold,
        };
        let task = pool.submit(chunk, mergesort_parallel);
        let sorted = task.join(&pool);
        assert!(check_sorted(&sorted), "sort failed");
        println!("result ok.");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_sort_sorts_small_slices() {
        let mut v = vec![5, 3, 8, 1, 9, 2];
        insertion_sort(&mut v);
        assert_eq!(v, vec![1, 2, 3, 5, 8, 9]);
    }

    #[test]
    fn merge_sorted_interleaves_two_sorted_halves() {
        assert_eq!(merge_sorted(vec![1, 3, 5], vec![2, 4, 6]), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(merge_sorted(vec![], vec![1, 2]), vec![1, 2]);
        assert_eq!(merge_sorted(vec![1, 2], vec![]), vec![1, 2]);
    }

    #[test]
    fn serial_mergesort_sorts() {
        let v: Vec<i32> = (0..500).rev().collect();
        let sorted = mergesort_serial(v, 16);
        assert!(check_sorted(&sorted));
    }

    #[test]
    fn parallel_mergesort_matches_serial_on_a_single_worker() {
        let pool = fj_core::pool_new(1).unwrap();
        let input: Vec<i32> = (0..2000).map(|i| (i * 7919) % 1009).collect();
        let chunk = SortChunk { v: input.clone(), min_task_size: 50, insertion_threshold: 16 };
        let sorted = pool.submit(chunk, mergesort_parallel).join(&pool);
        assert_eq!(sorted, mergesort_serial(input, 16));
    }
}
