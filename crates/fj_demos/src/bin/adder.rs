//! Smallest possible acceptance test: one worker, one task, one join.

fn main() {
    fj_demos::init_logging();

    let pool = fj_core::pool_new(1).expect("failed to start pool");
    let task = pool.submit((20usize, 22usize), |_pool, (a, b)| a + b);
    let sum = task.join(&pool);

    assert_eq!(sum, 42, "20 + 22 should be 42, got {sum}");
    println!("result ok: 20 + 22 = {sum}");
}
