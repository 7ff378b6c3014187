use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use drudge_pool::{
    ContextFactory, ExecutionContext, ExecutionError, FutureState, Method, MethodRegistry, Pool,
    PoolConfig, PoolError, TaskFuture, ThreadContextFactory, WorkerId,
};
use futures::future::join_all;
use serde_json::{json, Value};

fn arg_u64(args: &[Value], index: usize) -> Result<u64, String> {
    args.get(index)
        .and_then(Value::as_u64)
        .ok_or_else(|| format!("argument {index} must be an unsigned integer"))
}

/// `sleep(ms)`, `square(n)`, `fail(msg)`, `explode()` and `count()`, which
/// bumps `counter`.
fn registry(counter: Arc<AtomicUsize>) -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry
        .register("sleep", |args| {
            let ms = arg_u64(&args, 0)?;
            std::thread::sleep(Duration::from_millis(ms));
            Ok(json!(ms))
        })
        .unwrap();
    registry
        .register("square", |args| {
            let n = arg_u64(&args, 0)?;
            Ok(json!(n * n))
        })
        .unwrap();
    registry
        .register("fail", |args| {
            Err(args.first().and_then(Value::as_str).unwrap_or("failed").to_string())
        })
        .unwrap();
    registry
        .register("explode", |_| -> Result<Value, String> { panic!("boom") })
        .unwrap();
    registry
        .register("count", move |_| Ok(json!(counter.fetch_add(1, Ordering::SeqCst) + 1)))
        .unwrap();
    registry
}

fn pool(min: usize, max: usize) -> (Pool, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let pool = Pool::with_registry(registry(Arc::clone(&counter)), PoolConfig::bounded(min, max))
        .unwrap();
    (pool, counter)
}

/// Thread contexts, counting how many were started.
struct CountingFactory {
    inner: ThreadContextFactory,
    spawned: AtomicUsize,
}

impl ContextFactory for CountingFactory {
    fn spawn(&self, worker: WorkerId) -> Result<Arc<dyn ExecutionContext>, PoolError> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        self.inner.spawn(worker)
    }

    fn resolves(&self, method: &str) -> bool {
        self.inner.resolves(method)
    }
}

fn add(args: Vec<Value>) -> Result<Value, String> {
    let sum = args
        .iter()
        .map(|v| v.as_i64().ok_or("add expects integers"))
        .sum::<Result<i64, _>>()?;
    Ok(json!(sum))
}

#[tokio::test]
async fn each_task_settles_once_with_its_own_result() {
    let (pool, _) = pool(0, 3);
    let seen = Arc::new(AtomicUsize::new(0));

    let futures: Vec<TaskFuture<Value>> = (0..10u64)
        .map(|n| {
            let seen = Arc::clone(&seen);
            pool.exec("square", vec![json!(n)]).then(move |v| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(v)
            })
        })
        .collect();

    let results = join_all(futures).await;
    let expected: Vec<Result<Value, PoolError>> = (0..10u64).map(|n| Ok(json!(n * n))).collect();
    assert_eq!(results, expected);
    assert_eq!(seen.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn stats_always_add_up() {
    let (pool, _) = pool(1, 3);

    let futures: Vec<_> = (0..5).map(|_| pool.exec("sleep", vec![json!(20)])).collect();
    let stats = pool.stats();
    assert_eq!(stats.total_workers, stats.busy_workers + stats.idle_workers);
    assert_eq!(stats.total_workers, 3);
    assert_eq!(stats.pending_tasks, 2);

    join_all(futures).await;
    let stats = pool.stats();
    assert_eq!(stats.total_workers, stats.busy_workers + stats.idle_workers);
    assert_eq!(stats.busy_workers, 0);
}

#[tokio::test]
async fn never_spawns_more_than_max_workers() {
    let factory = Arc::new(CountingFactory {
        inner: ThreadContextFactory::new(registry(Arc::default())),
        spawned: AtomicUsize::new(0),
    });
    let pool = Pool::with_factory(factory.clone(), PoolConfig::bounded(0, 3)).unwrap();

    let futures: Vec<_> = (0..8).map(|_| pool.exec("sleep", vec![json!(10)])).collect();
    for outcome in join_all(futures).await {
        assert_eq!(outcome, Ok(json!(10)));
    }

    assert_eq!(factory.spawned.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cancelled_queued_task_never_runs() {
    let (pool, counter) = pool(1, 1);
    let running = pool.exec("sleep", vec![json!(30)]);
    let queued = pool.exec("count", vec![]);

    queued.cancel();

    assert_eq!(running.await, Ok(json!(30)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queued.state(), FutureState::Cancelled);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn running_task_timeout_replaces_the_worker() {
    let (pool, counter) = pool(1, 1);

    let started = Instant::now();
    let slow = pool.exec("sleep", vec![json!(50)]);
    slow.timeout(Duration::from_millis(5));

    assert_eq!(slow.await, Err(PoolError::Timeout(Duration::from_millis(5))));
    assert!(
        started.elapsed() < Duration::from_millis(50),
        "deadline must fire before the task would have finished, took {:?}",
        started.elapsed()
    );
    assert_eq!(pool.stats().total_workers, 1);
    assert_eq!(pool.exec("count", vec![]).await, Ok(json!(1)));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn queued_task_deadline_starts_when_it_runs() {
    let (pool, _) = pool(1, 1);
    let first = pool.exec("sleep", vec![json!(40)]);
    let second = pool.exec("sleep", vec![json!(1)]);

    // Shorter than the time spent queued behind `first`.
    second.timeout(Duration::from_millis(20));

    assert_eq!(first.await, Ok(json!(40)));
    assert_eq!(second.await, Ok(json!(1)));
}

#[tokio::test]
async fn all_waits_for_every_input_before_rejecting() {
    let (pool, _) = pool(3, 3);
    let slow = pool.exec("sleep", vec![json!(40)]);
    let inputs = vec![
        pool.exec("sleep", vec![json!(5)]),
        pool.exec("fail", vec![json!("second input failed")]),
        slow.clone(),
    ];

    let outcome = TaskFuture::all(inputs).await;

    assert_eq!(
        outcome,
        Err(PoolError::Execution(ExecutionError::Failed(
            "second input failed".into()
        )))
    );
    assert_eq!(slow.state(), FutureState::Resolved);
}

#[tokio::test]
async fn grows_from_min_to_max_and_queues_the_rest() {
    let (pool, _) = pool(2, 4);
    assert_eq!(pool.stats().total_workers, 2);

    let futures: Vec<_> = (0..6).map(|_| pool.exec("sleep", vec![json!(50)])).collect();

    let stats = pool.stats();
    assert_eq!(stats.total_workers, 4);
    assert_eq!(stats.busy_workers, 4);
    assert_eq!(stats.pending_tasks, 2);

    for outcome in join_all(futures).await {
        assert_eq!(outcome, Ok(json!(50)));
    }
    let stats = pool.stats();
    assert_eq!(stats.total_workers, 4);
    assert_eq!(stats.idle_workers, 4);
}

#[tokio::test]
async fn forced_terminate_cancels_busy_workers() {
    let (pool, _) = pool(3, 3);
    let futures: Vec<_> = (0..3).map(|_| pool.exec("sleep", vec![json!(100)])).collect();
    assert_eq!(pool.stats().busy_workers, 3);

    let started = Instant::now();
    pool.terminate(true, None).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(100));
    for outcome in join_all(futures).await {
        assert_eq!(outcome, Err(PoolError::Cancelled));
    }
    assert_eq!(pool.stats().total_workers, 0);
    assert_eq!(
        pool.exec("square", vec![json!(2)]).await,
        Err(PoolError::Terminated)
    );
}

#[tokio::test]
async fn dropping_the_pool_settles_running_and_queued_tasks() {
    let (pool, _) = pool(1, 1);
    let running = pool.exec("sleep", vec![json!(20)]);
    let queued = pool.exec("sleep", vec![json!(1)]);

    drop(pool);

    let bound = Duration::from_millis(500);
    assert_eq!(
        tokio::time::timeout(bound, running).await,
        Ok(Err(PoolError::Cancelled))
    );
    assert_eq!(
        tokio::time::timeout(bound, queued).await,
        Ok(Err(PoolError::Cancelled))
    );
}

#[tokio::test]
async fn graceful_terminate_lets_running_tasks_finish() {
    let (pool, _) = pool(2, 2);
    let running = pool.exec("sleep", vec![json!(30)]);

    pool.terminate(false, None).await.unwrap();

    assert_eq!(running.outcome(), Some(Ok(json!(30))));
    assert_eq!(pool.stats().total_workers, 0);
}

#[tokio::test]
async fn graceful_terminate_times_out_long_tasks() {
    let (pool, _) = pool(1, 1);
    let running = pool.exec("sleep", vec![json!(200)]);

    pool.terminate(false, Some(Duration::from_millis(20)))
        .await
        .unwrap();

    assert_eq!(
        running.outcome(),
        Some(Err(PoolError::Timeout(Duration::from_millis(20))))
    );
}

#[tokio::test]
async fn panicking_method_crashes_and_is_replaced() {
    let (pool, counter) = pool(1, 1);

    let outcome = pool.exec("explode", vec![]).await;

    assert_eq!(
        outcome,
        Err(PoolError::Execution(ExecutionError::Crashed("boom".into())))
    );
    assert_eq!(pool.stats().total_workers, 1);
    assert_eq!(pool.exec("count", vec![]).await, Ok(json!(1)));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn default_workers_run_inline_functions_only() {
    let pool = Pool::new(PoolConfig::bounded(1, 2)).unwrap();

    let sum = pool.exec(Method::inline(add), vec![json!(2), json!(3)]).await;
    assert_eq!(sum, Ok(json!(5)));

    let bad = pool.exec(Method::inline(add), vec![json!("x")]).await;
    assert_eq!(
        bad,
        Err(PoolError::Execution(ExecutionError::Failed(
            "add expects integers".into()
        )))
    );

    assert!(matches!(
        pool.exec("square", vec![json!(2)]).await,
        Err(PoolError::InvalidMethod(_))
    ));
}

#[tokio::test]
async fn proxy_exposes_worker_methods() {
    let (pool, _) = pool(1, 1);

    let proxy = pool.proxy().await.unwrap();

    assert!(proxy.has("square"));
    assert!(proxy.has("methods"));
    assert_eq!(proxy.call("square", vec![json!(4)]).await, Ok(json!(16)));
    assert!(matches!(
        proxy.call("missing", vec![]).await,
        Err(PoolError::InvalidMethod(_))
    ));
}

#[tokio::test]
async fn failure_handler_recovers_the_chain() {
    let (pool, _) = pool(1, 1);

    let recovered = pool
        .exec("fail", vec![json!("nope")])
        .catch(|err| Ok(json!(format!("recovered: {err}"))))
        .then(|v| Ok(v.as_str().map(str::len).unwrap_or_default()));

    assert_eq!(recovered.await, Ok("recovered: nope".len()));
}
