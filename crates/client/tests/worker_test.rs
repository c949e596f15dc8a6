//! Integration tests for job workers against the in-memory gateway
//!
//! Run with: cargo test -p jobflow-client --test worker_test

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobflow_client::gateway::{activated_job, InMemoryGateway};
use jobflow_client::prelude::*;
use tokio::sync::Semaphore;
use tonic::Code;

/// Poll `condition` until it holds or a generous bound expires
async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn setup() -> (Arc<InMemoryGateway>, Client) {
    let gateway = Arc::new(InMemoryGateway::new());
    let client = Client::with_gateway(gateway.clone());
    (gateway, client)
}

fn push_jobs(gateway: &InMemoryGateway, keys: impl IntoIterator<Item = i64>) {
    gateway.push_batch(keys.into_iter().map(|k| activated_job(k, "foo")).collect());
}

fn worker(client: &Client) -> JobWorkerBuilder {
    client
        .new_worker()
        .job_type("foo")
        .name("test-worker")
        .poll_interval(Duration::from_millis(10))
        .polling_timeout(Duration::from_millis(50))
        .shutdown_timeout(Duration::from_secs(5))
}

#[test_log::test(tokio::test)]
async fn test_end_to_end_auto_completion_in_order() {
    let (gateway, client) = setup();
    push_jobs(&gateway, [1, 2, 3]);

    let worker = worker(&client)
        .max_jobs_active(5)
        .handler_threads(1)
        .auto_completion(true)
        .handler(|_, _| async { Ok(()) })
        .open()
        .unwrap();

    wait_until(|| gateway.completed_keys().len() == 3).await;
    worker.close().await;

    assert_eq!(gateway.completed_keys(), vec![1, 2, 3]);
    assert!(gateway.failed_jobs().is_empty());

    let first = &gateway.activation_requests()[0];
    assert_eq!(first.r#type, "foo");
    assert_eq!(first.worker, "test-worker");
    assert_eq!(first.max_jobs_to_activate, 5);
}

#[test_log::test(tokio::test)]
async fn test_single_thread_handles_in_activation_order() {
    let (gateway, client) = setup();
    push_jobs(&gateway, [1, 2, 3]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();

    let worker = worker(&client)
        .handler_threads(1)
        .handler(move |_, job| {
            let seen = recorder.clone();
            async move {
                // Later jobs finish faster; order must still hold
                let delay = 30 - 10 * job.key() as u64;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                seen.lock().unwrap().push(job.key());
                Ok(())
            }
        })
        .open()
        .unwrap();

    wait_until(|| seen.lock().unwrap().len() == 3).await;
    worker.close().await;

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[test_log::test(tokio::test)]
async fn test_concurrent_handlers_see_each_job_once() {
    let (gateway, client) = setup();
    push_jobs(&gateway, [1, 2, 3]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (recorder, running_in, peak_in) = (seen.clone(), running.clone(), peak.clone());

    let worker = worker(&client)
        .handler_threads(3)
        .auto_completion(true)
        .handler(move |_, job| {
            let (seen, running, peak) = (recorder.clone(), running_in.clone(), peak_in.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                seen.lock().unwrap().push(job.key());
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .open()
        .unwrap();

    wait_until(|| gateway.completed_keys().len() == 3).await;
    worker.close().await;

    let mut keys = seen.lock().unwrap().clone();
    keys.sort_unstable();
    assert_eq!(keys, vec![1, 2, 3]);
    assert!(peak.load(Ordering::SeqCst) <= 3);

    let mut completed = gateway.completed_keys();
    completed.sort_unstable();
    assert_eq!(completed, vec![1, 2, 3]);
}

#[test_log::test(tokio::test)]
async fn test_no_commands_without_auto_completion() {
    let (gateway, client) = setup();
    push_jobs(&gateway, [1, 2, 3]);

    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();

    let worker = worker(&client)
        .auto_completion(false)
        .handler(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .open()
        .unwrap();

    wait_until(|| handled.load(Ordering::SeqCst) == 3 && worker.occupancy() == 0).await;
    worker.close().await;

    assert_eq!(gateway.command_attempts(), 0);
}

#[test_log::test(tokio::test)]
async fn test_handler_error_sends_fail_command() {
    let (gateway, client) = setup();
    push_jobs(&gateway, [1]);

    let worker = worker(&client)
        .auto_completion(true)
        .handler(|_, _| async { anyhow::bail!("card declined") })
        .open()
        .unwrap();

    wait_until(|| !gateway.failed_jobs().is_empty()).await;
    worker.close().await;

    let failed = gateway.failed_jobs();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job_key, 1);
    assert_eq!(failed[0].retries, 2);
    assert!(failed[0].error_message.contains("test-worker"));
    assert!(failed[0].error_message.contains("foo"));
    assert!(failed[0].error_message.contains("card declined"));
    assert!(gateway.completed_keys().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_handler_panic_sends_fail_command() {
    let (gateway, client) = setup();
    push_jobs(&gateway, [1, 2]);

    let worker = worker(&client)
        .auto_completion(true)
        .blocking_handler(|_, job| {
            if job.key() == 1 {
                panic!("unexpected state");
            }
            Ok(())
        })
        .open()
        .unwrap();

    wait_until(|| gateway.command_attempts() == 2).await;
    worker.close().await;

    let failed = gateway.failed_jobs();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job_key, 1);
    assert!(failed[0].error_message.contains("handler panicked"));
    assert_eq!(gateway.completed_keys(), vec![2]);
}

#[test_log::test(tokio::test)]
async fn test_handler_using_client_is_not_auto_completed() {
    let (gateway, client) = setup();
    push_jobs(&gateway, [1]);

    let worker = worker(&client)
        .auto_completion(true)
        .handler(|client, job| async move {
            client
                .new_throw_error_command(job.key())
                .error_code("PAYMENT_DECLINED")
                .send()
                .await?;
            Ok(())
        })
        .open()
        .unwrap();

    wait_until(|| worker.occupancy() == 0 && !gateway.thrown_errors().is_empty()).await;
    worker.close().await;

    assert_eq!(gateway.thrown_errors()[0].job_key, 1);
    assert!(gateway.completed_keys().is_empty());
    assert_eq!(gateway.command_attempts(), 1);
}

#[test_log::test(tokio::test)]
async fn test_refills_only_below_threshold() {
    let (gateway, client) = setup();
    push_jobs(&gateway, [1, 2, 3, 4, 5]);

    let gate = Arc::new(Semaphore::new(0));
    let handler_gate = gate.clone();

    let worker = worker(&client)
        .max_jobs_active(3)
        .auto_completion(true)
        .handler(move |_, _| {
            let gate = handler_gate.clone();
            async move {
                gate.acquire().await?.forget();
                Ok(())
            }
        })
        .open()
        .unwrap();

    wait_until(|| worker.occupancy() == 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.activation_requests().len(), 1);
    assert_eq!(gateway.activation_requests()[0].max_jobs_to_activate, 3);

    // Occupancy 2 is not below the threshold of 2
    gate.add_permits(1);
    wait_until(|| gateway.completed_keys().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.activation_requests().len(), 1);

    // Occupancy 1 refills the gap
    gate.add_permits(1);
    wait_until(|| gateway.activation_requests().len() >= 2).await;
    assert_eq!(gateway.activation_requests()[1].max_jobs_to_activate, 2);
    wait_until(|| worker.occupancy() == 3).await;

    gate.add_permits(3);
    wait_until(|| gateway.completed_keys().len() == 5).await;
    worker.close().await;

    assert_eq!(gateway.completed_keys(), vec![1, 2, 3, 4, 5]);
}

#[test_log::test(tokio::test)]
async fn test_poller_survives_activation_errors() {
    let (gateway, client) = setup();
    gateway.fail_next_activations(Code::Unavailable, 2);
    gateway.fail_next_activations(Code::PermissionDenied, 1);
    push_jobs(&gateway, [1, 2]);

    let worker = worker(&client)
        .auto_completion(true)
        .handler(|_, _| async { Ok(()) })
        .open()
        .unwrap();

    wait_until(|| gateway.completed_keys().len() == 2).await;
    worker.close().await;

    assert!(gateway.activation_requests().len() >= 4);
    assert_eq!(gateway.completed_keys(), vec![1, 2]);
}

#[test_log::test(tokio::test)]
async fn test_close_waits_for_in_flight_handlers() {
    let (gateway, client) = setup();
    push_jobs(&gateway, [1]);

    let started = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let (started_in, finished_in) = (started.clone(), finished.clone());

    let worker = worker(&client)
        .auto_completion(true)
        .handler(move |_, _| {
            let (started, finished) = (started_in.clone(), finished_in.clone());
            async move {
                started.store(true, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                finished.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .open()
        .unwrap();

    wait_until(|| started.load(Ordering::SeqCst)).await;
    worker.close().await;

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(gateway.completed_keys(), vec![1]);
    assert!(worker.is_closed());

    worker.close().await;
    assert!(worker.is_closed());
}

#[test_log::test(tokio::test)]
async fn test_closed_worker_stops_polling() {
    let (gateway, client) = setup();

    let worker = worker(&client)
        .handler(|_, _| async { Ok(()) })
        .open()
        .unwrap();

    wait_until(|| !gateway.activation_requests().is_empty()).await;
    worker.close().await;

    let polls = gateway.activation_requests().len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(gateway.activation_requests().len(), polls);
}

#[test_log::test(tokio::test)]
async fn test_invalid_configuration_is_rejected() {
    let (gateway, client) = setup();

    let err = client
        .new_worker()
        .handler(|_, _| async { Ok(()) })
        .open()
        .unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));

    let err = worker(&client)
        .max_jobs_active(0)
        .handler(|_, _| async { Ok(()) })
        .open()
        .unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));

    let err = worker(&client).open().unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(gateway.activation_requests().is_empty());
}
