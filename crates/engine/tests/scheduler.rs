//! Scheduler behaviour: validation, at-least-once polling, lifecycle helpers.

mod common;

use chrono::{Duration, Utc};
use uuid::Uuid;

use courier_common::error::CourierError;
use courier_common::types::{DeliveryStatus, NotificationType, ScheduledNotification};
use courier_engine::scheduler::CLAIM_BATCH_SIZE;

use common::{harness, past_event, recipient};

fn due_row(user_id: Uuid, notification_type: NotificationType) -> ScheduledNotification {
    let now = Utc::now();
    ScheduledNotification {
        id: Uuid::new_v4(),
        user_id,
        notification_type,
        run_after: now - Duration::minutes(5),
        payload: serde_json::json!({ "location": "Park & Ride North" }),
        created_at: now - Duration::days(1),
    }
}

#[tokio::test]
async fn test_schedule_rejects_past_run_after() {
    let h = harness();

    let err = h
        .services
        .scheduler
        .schedule(
            Uuid::new_v4(),
            NotificationType::MeetingReminder,
            Utc::now() - Duration::seconds(1),
            serde_json::json!({}),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CourierError::Validation(_)));
    assert!(h.store.schedules().await.is_empty());
}

#[tokio::test]
async fn test_schedule_rejects_non_object_payload() {
    let h = harness();

    let err = h
        .services
        .scheduler
        .schedule(
            Uuid::new_v4(),
            NotificationType::NurtureFollowup,
            Utc::now() + Duration::days(1),
            serde_json::json!(["not", "an", "object"]),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CourierError::Validation(_)));
}

#[tokio::test]
async fn test_schedule_rejects_type_without_template() {
    let h = harness();

    let err = h
        .services
        .scheduler
        .schedule(
            Uuid::new_v4(),
            NotificationType::Announcement,
            Utc::now() + Duration::days(1),
            serde_json::json!({}),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CourierError::Validation(_)));
    assert!(h.store.schedules().await.is_empty());
}

#[tokio::test]
async fn test_schedule_persists_future_intent() {
    let h = harness();
    let user_id = Uuid::new_v4();
    let run_after = Utc::now() + Duration::hours(2);

    let scheduled = h
        .services
        .scheduler
        .schedule(
            user_id,
            NotificationType::NurtureFollowup,
            run_after,
            serde_json::json!({}),
        )
        .await
        .unwrap();

    assert_eq!(scheduled.run_after, run_after);
    assert_eq!(h.store.schedules().await, vec![scheduled]);

    // Not due yet.
    let summary = h.services.scheduler.process_due().await.unwrap();
    assert_eq!(summary.processed, 0);
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_failed_delivery_is_retried_on_next_poll() {
    let h = harness();
    let rider = recipient(1);
    h.store.add_recipient(rider.clone()).await;
    let row = due_row(rider.user_id, NotificationType::MeetingReminder);
    h.store.insert_schedule(row.clone()).await;

    h.transport.fail_next(1);
    let first = h.services.scheduler.process_due().await.unwrap();
    assert_eq!(first.processed, 0);
    assert_eq!(first.errors.len(), 1);
    assert_eq!(first.errors[0].id, row.id);
    assert_eq!(h.store.schedules().await.len(), 1);

    let second = h.services.scheduler.process_due().await.unwrap();
    assert_eq!(second.processed, 1);
    assert!(second.errors.is_empty());
    assert!(h.store.schedules().await.is_empty());

    let third = h.services.scheduler.process_due().await.unwrap();
    assert_eq!(third.processed, 0);
    assert_eq!(h.transport.call_count(), 2);

    let sent = h.transport.calls();
    assert!(sent[1].text.contains("Park & Ride North"));
    assert!(sent[1].text.contains("Hi Rider1,"));
}

#[tokio::test]
async fn test_poll_handles_one_bounded_batch() {
    let h = harness();
    let total = CLAIM_BATCH_SIZE + 3;
    for n in 1..=total {
        let rider = recipient(n);
        h.store.add_recipient(rider.clone()).await;
        h.store
            .insert_schedule(due_row(rider.user_id, NotificationType::NurtureFollowup))
            .await;
    }

    let first = h.services.scheduler.process_due().await.unwrap();
    assert_eq!(first.processed, CLAIM_BATCH_SIZE);
    assert_eq!(h.store.schedules().await.len(), 3);

    let second = h.services.scheduler.process_due().await.unwrap();
    assert_eq!(second.processed, 3);
    assert!(h.store.schedules().await.is_empty());
    assert_eq!(h.transport.call_count(), total);
}

#[tokio::test]
async fn test_unaddressable_user_keeps_row_pending() {
    let h = harness();
    let rider = recipient(2);
    h.store.add_recipient(rider.clone()).await;
    h.store.suppress(rider.user_id).await;
    h.store
        .insert_schedule(due_row(rider.user_id, NotificationType::NurtureFollowup))
        .await;

    let summary = h.services.scheduler.process_due().await.unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].message.contains("No addressable recipient"));
    assert_eq!(h.store.schedules().await.len(), 1);
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_already_delivered_single_shot_retires_row() {
    let h = harness();
    let rider = recipient(3);
    h.store.add_recipient(rider.clone()).await;
    h.store
        .insert_event(past_event(
            rider.user_id,
            NotificationType::NurtureIntro,
            DeliveryStatus::Sent,
            Utc::now() - Duration::hours(1),
        ))
        .await;
    h.store
        .insert_schedule(due_row(rider.user_id, NotificationType::NurtureIntro))
        .await;

    let summary = h.services.scheduler.process_due().await.unwrap();

    assert_eq!(summary.processed, 1);
    assert!(h.store.schedules().await.is_empty());
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_one_failure_does_not_block_other_rows() {
    let h = harness();
    let ok = recipient(4);
    let bad = recipient(5);
    h.store.add_recipient(ok.clone()).await;
    h.store.add_recipient(bad.clone()).await;
    h.transport.fail_address(&bad.email);
    h.store
        .insert_schedule(due_row(bad.user_id, NotificationType::MeetingReminder))
        .await;
    h.store
        .insert_schedule(due_row(ok.user_id, NotificationType::MeetingReminder))
        .await;

    let summary = h.services.scheduler.process_due().await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.errors.len(), 1);
    let remaining = h.store.schedules().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].user_id, bad.user_id);
}

#[tokio::test]
async fn test_concurrent_polls_do_not_double_send() {
    let h = harness();
    let rider = recipient(6);
    h.store.add_recipient(rider.clone()).await;
    h.store
        .insert_schedule(due_row(rider.user_id, NotificationType::MeetingReminder))
        .await;

    let scheduler = h.services.scheduler.clone();
    let (a, b) = tokio::join!(scheduler.process_due(), scheduler.process_due());

    assert_eq!(a.unwrap().processed + b.unwrap().processed, 1);
    assert_eq!(h.transport.call_count(), 1);
}

#[tokio::test]
async fn test_schedule_nurture_queues_both_steps() {
    let h = harness();
    let user_id = Uuid::new_v4();
    let signup_at = Utc::now();

    let steps = h
        .services
        .scheduler
        .schedule_nurture(user_id, signup_at)
        .await
        .unwrap();

    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].notification_type, NotificationType::NurtureIntro);
    assert_eq!(steps[0].run_after, signup_at + Duration::days(1));
    assert_eq!(steps[1].notification_type, NotificationType::NurtureFollowup);
    assert_eq!(steps[1].run_after, signup_at + Duration::days(3));
}

#[tokio::test]
async fn test_meeting_reminder_lead_time() {
    let h = harness();
    let user_id = Uuid::new_v4();
    let meeting_id = Uuid::new_v4();
    let starts_at = Utc::now() + Duration::days(3);

    let reminder = h
        .services
        .scheduler
        .schedule_meeting_reminder(user_id, meeting_id, starts_at, Some("Station lot B"))
        .await
        .unwrap();

    assert_eq!(reminder.run_after, starts_at - Duration::hours(24));
    assert_eq!(reminder.payload["meeting_id"], serde_json::json!(meeting_id));
    assert_eq!(reminder.payload["location"], "Station lot B");

    // A meetup in less than a day cannot get a reminder a day ahead.
    let err = h
        .services
        .scheduler
        .schedule_meeting_reminder(user_id, meeting_id, Utc::now() + Duration::hours(3), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::Validation(_)));
}
