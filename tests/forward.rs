mod common;

use common::logging;
use common::topology::any_local_port;
use common::topology::next_progress;
use common::topology::remaining_progress;
use common::topology::test_args;
use common::topology::within;
use remote_tasks::AddJobError;
use remote_tasks::CallerClient;
use remote_tasks::ConstantWork;
use remote_tasks::JobCompletion;
use remote_tasks::JobHandleError;
use remote_tasks::ProgressReporter;
use remote_tasks::RunnerServer;
use remote_tasks::WorkResult;
use serde_json::json;
use serde_json::Value;

async fn count_to_four(_arguments: Vec<Value>, progress: ProgressReporter) -> WorkResult {
    for step in 1..=4 {
        progress.report(step);
    }
    Ok(json!("success"))
}

/// test: a Caller dials a Runner-host and observes a job's progress
///
/// scenario:
/// 1. a Runner-host serves work that reports 1, 2, 3, 4 and resolves.
/// 2. a Caller dials it and issues one job.
/// 3. the Caller sees every report, in order, and then the value.
#[tokio::test(flavor = "multi_thread")]
pub async fn caller_sees_progress_then_value() -> anyhow::Result<()> {
    logging::tracing_logger();

    let runner = remote_tasks::serve(count_to_four, any_local_port()).await?;
    let caller = remote_tasks::client(runner.local_addr().to_string());

    let mut seen = vec![];
    let value = within(caller.call(vec![])?.with_progress(|p| seen.push(p))).await?;

    assert_eq!(vec![json!(1), json!(2), json!(3), json!(4)], seen);
    assert_eq!(json!("success"), value);
    assert_eq!(0, caller.num_pending());

    caller.close().await;
    runner.close().await;
    Ok(())
}

/// test: a rejection reaches the Caller carrying exactly the rejected value
#[tokio::test(flavor = "multi_thread")]
pub async fn rejection_carries_raw_value() -> anyhow::Result<()> {
    logging::tracing_logger();

    let failing = |arguments: Vec<Value>, _progress: ProgressReporter| async move {
        WorkResult::Err(json!({ "reason": "boom", "arguments": arguments }))
    };
    let runner = remote_tasks::serve(failing, any_local_port()).await?;
    let caller = remote_tasks::client(runner.local_addr().to_string());

    let err = within(caller.call(vec![json!(7)])?.with_progress(|_| {}))
        .await
        .unwrap_err();
    assert!(matches!(err, JobHandleError::JobRejected(_)));
    assert_eq!(
        Some(&json!({ "reason": "boom", "arguments": [7] })),
        err.rejection()
    );

    caller.close().await;
    runner.close().await;
    Ok(())
}

/// test: work that completes without suspending resolves like any other
#[tokio::test(flavor = "multi_thread")]
pub async fn constant_work_resolves() -> anyhow::Result<()> {
    logging::tracing_logger();

    let runner = remote_tasks::serve(ConstantWork(json!(42)), any_local_port()).await?;
    let caller = remote_tasks::client(runner.local_addr().to_string());

    let handles = vec![caller.call(vec![])?, caller.run(vec![])?, caller.request(vec![])?];
    for handle in handles {
        assert_eq!(JobCompletion::Resolved(json!(42)), within(handle).await?);
    }

    caller.close().await;
    runner.close().await;
    Ok(())
}

/// test: a job survives the loss of the Runner-host executing it
///
/// scenario:
/// 1. the first Runner-host reports `prog 1:1`, `prog 2:1` and then stalls.
/// 2. it goes away, and a second one is started on the same address.
/// 3. the Caller reconnects and redelivers the job; the second Runner-host
///    reports `prog 1:2` .. `prog 4:2` and resolves.
/// 4. the Caller sees all six reports on the same progress stream, and the
///    second Runner-host's value on the same handle.
#[tokio::test(flavor = "multi_thread")]
pub async fn job_is_redelivered_after_runner_host_restarts() -> anyhow::Result<()> {
    logging::tracing_logger();

    let stalling = |_arguments: Vec<Value>, progress: ProgressReporter| async move {
        progress.report("prog 1:1");
        progress.report("prog 2:1");
        std::future::pending::<WorkResult>().await
    };
    let completing = |_arguments: Vec<Value>, progress: ProgressReporter| async move {
        for step in 1..=4 {
            progress.report(format!("prog {step}:2"));
        }
        WorkResult::Ok(json!("success 2"))
    };

    let first_runner = RunnerServer::bind(stalling, any_local_port(), test_args()).await?;
    let address = first_runner.local_addr();
    let caller = CallerClient::connect(address.to_string(), test_args());

    let mut handle = caller.issue(vec![json!("job")])?;
    let mut progress = handle.take_progress().unwrap();
    let mut seen = next_progress(&mut progress, 2).await;

    first_runner.close().await;
    let second_runner = RunnerServer::bind(completing, address, test_args()).await?;

    assert_eq!(JobCompletion::Resolved(json!("success 2")), within(handle).await?);
    seen.extend(remaining_progress(&mut progress).await);
    assert_eq!(
        vec![
            json!("prog 1:1"),
            json!("prog 2:1"),
            json!("prog 1:2"),
            json!("prog 2:2"),
            json!("prog 3:2"),
            json!("prog 4:2"),
        ],
        seen
    );

    caller.close().await;
    second_runner.close().await;
    Ok(())
}

/// test: closing a Caller cancels its pending jobs and refuses new ones
#[tokio::test(flavor = "multi_thread")]
pub async fn closing_caller_cancels_pending_jobs() -> anyhow::Result<()> {
    logging::tracing_logger();

    let never = |_arguments: Vec<Value>, progress: ProgressReporter| async move {
        progress.report("started");
        std::future::pending::<WorkResult>().await
    };
    let runner = RunnerServer::bind(never, any_local_port(), test_args()).await?;
    let caller = CallerClient::connect(runner.local_addr().to_string(), test_args());

    let mut dispatched = caller.call(vec![])?;
    let mut progress = dispatched.take_progress().unwrap();
    next_progress(&mut progress, 1).await;
    let queued = caller.call(vec![])?;

    caller.close().await;

    assert_eq!(JobCompletion::Cancelled, within(dispatched).await?);
    assert!(matches!(
        within(queued.with_progress(|_| {})).await,
        Err(JobHandleError::JobCancelled)
    ));
    assert_eq!(Err(AddJobError::CallerClosed), caller.call(vec![]).map(|_| ()));

    runner.close().await;
    Ok(())
}
