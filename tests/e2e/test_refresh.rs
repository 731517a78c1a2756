use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use trenara_client::{ApiError, CredentialStore, ForwardedIdentity, RequestOptions};

use crate::helpers::TestContext;

#[tokio::test]
async fn it_should_issue_one_refresh_for_a_storm_of_concurrent_unauthorized_requests() {
    let ctx = TestContext::new().await;
    ctx.seed_stale_credential().await;
    ctx.upstream.state.refresh_delay_ms.store(100, Ordering::SeqCst);

    let body = json!({"rpe": 7});
    let r1 = ctx.client.get::<Value>("/goal", RequestOptions::new());
    let r2 = ctx.client.get::<Value>("/schedule", RequestOptions::new());
    let r3 = ctx
        .client
        .put::<Value, _>("/entries/5/rpe", Some(&body), RequestOptions::new());

    let (r1, r2, r3) = futures::join!(r1, r2, r3);

    let goal = r1.expect("goal after refresh");
    assert_eq!(goal["goal"]["distance_km"], 42.2);
    r2.expect("schedule after refresh");
    let entry = r3.expect("rpe update after refresh");
    assert_eq!(entry["id"], 5);

    assert_eq!(ctx.upstream.state.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn it_should_replay_queued_requests_in_enqueue_order() {
    let ctx = TestContext::new().await;
    ctx.seed_stale_credential().await;
    ctx.upstream.state.refresh_delay_ms.store(200, Ordering::SeqCst);

    // Stagger the launches so the enqueue order is deterministic: R1 trips
    // the refresh, R2 and R3 arrive while it is still in flight.
    let c1 = ctx.client.clone();
    let r1 = tokio::spawn(async move { c1.get::<Value>("/goal", RequestOptions::new()).await });
    tokio::time::sleep(Duration::from_millis(40)).await;

    let c2 = ctx.client.clone();
    let r2 = tokio::spawn(async move { c2.get::<Value>("/schedule", RequestOptions::new()).await });
    tokio::time::sleep(Duration::from_millis(40)).await;

    let c3 = ctx.client.clone();
    let r3 = tokio::spawn(async move {
        c3.put::<Value, _>("/entries/5/rpe", Some(&json!({"rpe": 8})), RequestOptions::new())
            .await
    });

    r1.await.unwrap().expect("goal");
    r2.await.unwrap().expect("schedule");
    r3.await.unwrap().expect("rpe update");

    assert_eq!(ctx.upstream.state.refresh_calls.load(Ordering::SeqCst), 1);
    // Only the replays are authorized; their order is the enqueue order.
    assert_eq!(
        ctx.upstream.state.authorized_paths(),
        vec!["/goal", "/schedule", "/entries/5/rpe"]
    );
}

#[tokio::test]
async fn it_should_reject_the_whole_queue_when_refresh_fails() {
    let ctx = TestContext::new().await;
    ctx.seed_stale_credential().await;
    ctx.upstream.state.refresh_delay_ms.store(100, Ordering::SeqCst);
    ctx.upstream.state.refresh_fails.store(true, Ordering::SeqCst);

    let body = json!({"rpe": 7});
    let r1 = ctx.client.get::<Value>("/goal", RequestOptions::new());
    let r2 = ctx.client.get::<Value>("/schedule", RequestOptions::new());
    let r3 = ctx
        .client
        .put::<Value, _>("/entries/5/rpe", Some(&body), RequestOptions::new());

    let (r1, r2, r3) = futures::join!(r1, r2, r3);

    for result in [r1, r2, r3] {
        assert!(matches!(result, Err(ApiError::AuthenticationFailed(_))));
    }

    assert_eq!(ctx.upstream.state.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(ctx.store.get().await.is_none(), "credential must be cleared");
    assert_eq!(
        ctx.upstream.state.authorized_paths(),
        Vec::<String>::new(),
        "nothing may be replayed after a failed refresh"
    );
}

#[tokio::test]
async fn it_should_fail_fast_without_refreshing_when_no_credential_is_stored() {
    let ctx = TestContext::new().await;

    let result = ctx.client.get::<Value>("/goal", RequestOptions::new()).await;

    assert!(matches!(result, Err(ApiError::AuthenticationFailed(_))));
    assert_eq!(ctx.upstream.state.refresh_calls.load(Ordering::SeqCst), 0);
    assert!(
        ctx.upstream.state.requests().is_empty(),
        "the upstream must not be contacted without a credential"
    );
}

#[tokio::test]
async fn it_should_share_one_refresh_outcome_across_direct_callers() {
    let ctx = TestContext::new().await;
    ctx.seed_stale_credential().await;
    ctx.upstream.state.refresh_delay_ms.store(100, Ordering::SeqCst);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let tokens = ctx.tokens.clone();
        handles.push(tokio::spawn(async move { tokens.refresh().await }));
    }

    for handle in handles {
        assert!(handle.await.unwrap(), "every caller sees the one success");
    }

    assert_eq!(ctx.upstream.state.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn it_should_complete_a_refresh_abandoned_by_its_caller() {
    let ctx = TestContext::new().await;
    ctx.seed_stale_credential().await;
    ctx.upstream.state.refresh_delay_ms.store(200, Ordering::SeqCst);

    // The caller that starts the flight gives up long before it resolves.
    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), ctx.tokens.refresh()).await;
    assert!(abandoned.is_err(), "the waiter must have timed out");

    // The flight it started still runs to completion and rotates the
    // credential.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(ctx.upstream.state.refresh_calls.load(Ordering::SeqCst), 1);
    let credential = ctx.store.get().await.expect("rotated credential");
    assert_eq!(credential.access_token, ctx.upstream.state.current_access());

    // Later refreshes start fresh flights as usual.
    ctx.upstream.state.refresh_delay_ms.store(0, Ordering::SeqCst);
    assert!(ctx.tokens.refresh().await);
    assert_eq!(ctx.upstream.state.refresh_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn it_should_replay_a_queued_get_identically_to_a_fresh_call() {
    let ctx = TestContext::new().await;
    ctx.seed_stale_credential().await;

    let replayed = ctx
        .client
        .get::<Value>("/goal", RequestOptions::new())
        .await
        .expect("replayed GET");

    let fresh = ctx
        .client
        .get::<Value>("/goal", RequestOptions::new())
        .await
        .expect("fresh GET");

    assert_eq!(replayed, fresh);
    assert_eq!(ctx.upstream.state.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn it_should_preserve_the_forwarded_identity_on_replay() {
    let ctx = TestContext::new().await;
    ctx.seed_stale_credential().await;

    let options = RequestOptions::new()
        .forwarded_identity(ForwardedIdentity::from_cookies([("trenara_session", "abc123")]));

    ctx.client
        .get::<Value>("/goal", options)
        .await
        .expect("goal after refresh");

    let attempts: Vec<_> = ctx
        .upstream
        .state
        .requests()
        .into_iter()
        .filter(|r| r.path == "/goal")
        .collect();
    assert_eq!(attempts.len(), 2, "original attempt plus one replay");

    for attempt in &attempts {
        assert_eq!(attempt.method, "GET");
        assert_eq!(attempt.cookie.as_deref(), Some("trenara_session=abc123"));
    }
    assert_eq!(
        attempts[0].request_id, attempts[1].request_id,
        "the replay is the same logical request"
    );
}
