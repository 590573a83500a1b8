//! Parallel quicksort. Partitions the owned buffer in place, forks the left
//! partition to the pool as its own buffer, recurses into the right
//! partition directly, then joins the fork and concatenates the results.
//! Below a configurable recursion-depth bound, falls back to ordinary
//! serial quicksort.

use clap::Parser;
use fj_core::Pool;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_DEPTH: u32 = 3;
const DEFAULT_THREADS: usize = 4;

#[derive(Parser)]
#[command(about = "Parallel quicksort demo")]
struct Args {
    /// Maximum depth to which each recursive call is forked to the pool.
    #[arg(short = 'd', long = "depth", default_value_t = DEFAULT_DEPTH)]
    depth: u32,

    /// Number of worker threads in the pool.
    #[arg(short = 'n', long = "threads", default_value_t = DEFAULT_THREADS)]
    threads: usize,

    /// Also run (and time) a fully serial quicksort for comparison.
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

/// Partition `array[left..=right]` using the middle element as pivot,
/// Lomuto-style: elements less than the pivot are swapped forward into a
/// `last` cursor as `current` scans right. Returns the pivot's final index.
fn partition(array: &mut [i32], left: usize, right: usize) -> usize {
    let middle = left + (right - left) / 2;
    array.swap(left, middle);

    let mut last = left;
    for current in (left + 1)..=right {
        if array[current] < array[left] {
            last += 1;
            array.swap(last, current);
        }
    }
    array.swap(left, last);
    last
}

fn quicksort_range(array: &mut [i32], left: usize, right: usize) {
    if left >= right {
        return;
    }
    let split = partition(array, left, right);
    if split > left {
        quicksort_range(array, left, split - 1);
    }
    quicksort_range(array, split + 1, right);
}

fn quicksort_serial(mut v: Vec<i32>) -> Vec<i32> {
    if v.len() > 1 {
        let last = v.len() - 1;
        quicksort_range(&mut v, 0, last);
    }
    v
}

struct QuicksortTask {
    v: Vec<i32>,
    depth: u32,
}

/// Parallel quicksort over an owned buffer: forks the left partition as its
/// own buffer, recurses directly into the right, and concatenates the two
/// sorted halves with the pivot back together.
fn quicksort_parallel(pool: &Pool, task: QuicksortTask) -> Vec<i32> {
    let QuicksortTask { mut v, depth } = task;
    if v.len() <= 1 {
        return v;
    }

    let last = v.len() - 1;
    let split = partition(&mut v, 0, last);
    let mut right = v.split_off(split + 1);
    let pivot = v.pop().expect("partition leaves at least the pivot behind");

    if depth < 1 {
        quicksort_range(&mut v, 0, v.len().saturating_sub(1));
        quicksort_range(&mut right, 0, right.len().saturating_sub(1));
        v.push(pivot);
        v.extend(right);
        return v;
    }

    let left_task = pool.submit(QuicksortTask { v, depth: depth - 1 }, quicksort_parallel);
    let right_sorted = quicksort_parallel(pool, QuicksortTask { v: right, depth: depth - 1 });
    let mut left_sorted = left_task.join(pool);
    left_sorted.push(pivot);
    left_sorted.extend(right_sorted);
    left_sorted
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
        fj_demos::benchmark("qsort serial", false, || {
            let sorted = quicksort_serial(input.clone());
            assert!(check_sorted(&sorted));
            println!("result ok.");
        });
    }

    println!("Using {} threads, recursive parallel depth={}", args.threads, args.depth);
    let pool = fj_core::pool_new(args.threads).expect("failed to start pool");
    fj_demos::benchmark("qsort parallel", true, || {
        let task = QuicksortTask { v: input.clone(), depth: args.depth };
        let root = pool.submit(task, quicksort_parallel);
        let sorted = root.join(&pool);
        assert!(check_sorted(&sorted), "sort failed");
        println!("result ok.");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_places_pivot_and_orders_around_it() {
        let mut v = vec![5, 3, 8, 1, 9, 2];
        let split = partition(&mut v, 0, v.len() - 1);
        let pivot = v[split];
        assert!(v[..split].iter().all(|&x| x < pivot));
        assert!(v[split + 1..].iter().all(|&x| x >= pivot));
    }

    #[test]
    fn serial_quicksort_sorts() {
        let v = vec![9, 1, 8, 2, 7, 3, 6, 4, 5, 0];
        assert!(check_sorted(&quicksort_serial(v)));
    }

    #[test]
    fn parallel_quicksort_matches_serial_on_a_single_worker() {
        let pool = fj_core::pool_new(1).unwrap();
        let input: Vec<i32> = (0..500).rev().collect();
        let task = QuicksortTask { v: input.clone(), depth: 3 };
        let sorted = pool.submit(task, quicksort_parallel).join(&pool);
        assert_eq!(sorted, quicksort_serial(input));
    }

    #[test]
    fn empty_and_singleton_inputs_are_handled() {
        assert_eq!(quicksort_serial(vec![]), Vec::<i32>::new());
        assert_eq!(quicksort_serial(vec![1]), vec![1]);
    }
}
