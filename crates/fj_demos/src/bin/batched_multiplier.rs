//! Acceptance test: submit a batch of independent tasks from outside the
//! pool, then join every one of them, on a single worker.

const BATCH_SIZE: usize = 200;

fn main() {
    fj_demos::init_logging();

    let pool = fj_core::pool_new(1).expect("failed to start pool");
    let tasks: Vec<_> = (0..BATCH_SIZE)
        .map(|i| pool.submit(i, |_pool, i| i * (i + 1)))
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let result = task.join(&pool);
        assert_eq!(result, i * (i + 1), "task {i} produced {result}");
    }

    println!("result ok: all {BATCH_SIZE} batched tasks matched i * (i + 1)");
}
