//! Bulk dispatcher: batching, pacing, retries and aggregate accounting.

mod common;

use std::time::Duration;

use courier_common::error::CourierError;
use courier_engine::bulk::{BulkContent, BulkOptions};

use common::{harness, recipient};

fn content() -> BulkContent {
    BulkContent {
        subject: "Hi {{first_name}}".to_string(),
        html: "<p>Hello {{first_name}} {{last_name}}, new routes are live.</p>".to_string(),
        text: None,
    }
}

#[tokio::test]
async fn test_third_recipient_failing_in_batches_of_two() {
    let h = harness();
    let recipients: Vec<_> = (1..=5).map(recipient).collect();
    h.transport.fail_address(&recipients[2].email);

    let result = h
        .services
        .bulk
        .dispatch(
            content(),
            recipients.clone(),
            BulkOptions {
                batch_size: 2,
                delay_ms: 0,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.total_users, 5);
    assert_eq!(result.successful, 4);
    assert_eq!(result.failed, 1);
    assert_eq!(result.batches, 3);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].email, recipients[2].email);
    assert!(result.errors[0].error.contains("mailbox unavailable"));

    // Two inter-batch pauses plus the failing recipient's two backoffs.
    assert_eq!(h.pacer.count_of(Duration::from_millis(0)), 2);
    assert_eq!(h.pacer.count_of(Duration::from_millis(1000)), 1);
    assert_eq!(h.pacer.count_of(Duration::from_millis(2000)), 1);
}

#[tokio::test]
async fn test_exhausted_recipient_is_attempted_three_times() {
    let h = harness();
    let recipients = vec![recipient(1)];
    h.transport.fail_address(&recipients[0].email);

    let result = h
        .services
        .bulk
        .dispatch(content(), recipients.clone(), BulkOptions::default())
        .await
        .unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(h.transport.calls_to(&recipients[0].email), 3);
    assert_eq!(
        h.pacer.pauses(),
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );
}

#[tokio::test]
async fn test_transient_failure_recovers_on_retry() {
    let h = harness();
    let recipients = vec![recipient(1)];
    h.transport.fail_next(1);

    let result = h
        .services
        .bulk
        .dispatch(content(), recipients, BulkOptions::default())
        .await
        .unwrap();

    assert_eq!(result.successful, 1);
    assert!(result.errors.is_empty());
    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(h.pacer.pauses(), vec![Duration::from_millis(1000)]);
}

#[tokio::test]
async fn test_batch_pacing() {
    let h = harness();
    let recipients: Vec<_> = (1..=7).map(recipient).collect();

    let result = h
        .services
        .bulk
        .dispatch(
            content(),
            recipients,
            BulkOptions {
                batch_size: 3,
                delay_ms: 250,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.batches, 3);
    assert_eq!(h.pacer.pauses(), vec![Duration::from_millis(250); 2]);
}

#[tokio::test]
async fn test_single_batch_never_pauses() {
    let h = harness();
    let recipients: Vec<_> = (1..=4).map(recipient).collect();

    let result = h
        .services
        .bulk
        .dispatch(
            content(),
            recipients,
            BulkOptions {
                batch_size: 4,
                delay_ms: 5000,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.batches, 1);
    assert!(h.pacer.pauses().is_empty());
}

#[tokio::test]
async fn test_aggregate_accounting() {
    let h = harness();
    let recipients: Vec<_> = (1..=12).map(recipient).collect();
    for r in recipients.iter().step_by(4) {
        h.transport.fail_address(&r.email);
    }

    let result = h
        .services
        .bulk
        .dispatch(
            content(),
            recipients.clone(),
            BulkOptions {
                batch_size: 5,
                delay_ms: 10,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.successful + result.failed, result.total_users);
    assert_eq!(result.failed, 3);
    assert_eq!(result.errors.len(), result.failed);

    let failed: Vec<&str> = result.errors.iter().map(|e| e.email.as_str()).collect();
    let expected: Vec<&str> = recipients
        .iter()
        .step_by(4)
        .map(|r| r.email.as_str())
        .collect();
    assert_eq!(failed, expected);
}

#[tokio::test]
async fn test_content_is_personalized_per_recipient() {
    let h = harness();
    let recipients = vec![recipient(1), recipient(2)];

    h.services
        .bulk
        .dispatch(content(), recipients, BulkOptions::default())
        .await
        .unwrap();

    let mut calls = h.transport.calls();
    calls.sort_by(|a, b| a.to.cmp(&b.to));
    assert_eq!(calls[0].subject, "Hi Rider1");
    assert_eq!(calls[1].subject, "Hi Rider2");
    assert!(calls[0].html.contains("Hello Rider1 Test"));
    assert_eq!(calls[0].text, "Hello Rider1 Test, new routes are live.");
}

#[tokio::test]
async fn test_names_are_escaped_only_in_html_body() {
    let h = harness();
    let mut rider = recipient(1);
    rider.last_name = Some("<Neil & Co>".to_string());

    h.services
        .bulk
        .dispatch(content(), vec![rider], BulkOptions::default())
        .await
        .unwrap();

    let calls = h.transport.calls();
    assert!(calls[0].html.contains("Hello Rider1 &lt;Neil &amp; Co&gt;"));
    assert_eq!(calls[0].text, "Hello Rider1 <Neil & Co>, new routes are live.");
}

#[tokio::test]
async fn test_malformed_placeholder_is_rejected_before_sending() {
    let h = harness();
    let mut broken = content();
    broken.subject = "Hi {{first_name".to_string();

    let err = h
        .services
        .bulk
        .dispatch(broken, vec![recipient(1)], BulkOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CourierError::Validation(_)));
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_sending() {
    let h = harness();
    let recipients: Vec<_> = (1..=2).map(recipient).collect();

    let bad_options = [
        BulkOptions {
            batch_size: 0,
            delay_ms: 0,
        },
        BulkOptions {
            batch_size: 101,
            delay_ms: 0,
        },
        BulkOptions {
            batch_size: 10,
            delay_ms: 10_001,
        },
    ];
    for options in bad_options {
        let err = h
            .services
            .bulk
            .dispatch(content(), recipients.clone(), options)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));
    }

    let mut no_subject = content();
    no_subject.subject = "".to_string();
    let err = h
        .services
        .bulk
        .dispatch(no_subject, recipients.clone(), BulkOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::Validation(_)));

    let mut no_html = content();
    no_html.html = " ".to_string();
    let err = h
        .services
        .bulk
        .dispatch(no_html, recipients, BulkOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::Validation(_)));

    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_empty_recipient_set_is_not_found() {
    let h = harness();

    let err = h
        .services
        .bulk
        .dispatch(content(), Vec::new(), BulkOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CourierError::NotFound(_)));
}
