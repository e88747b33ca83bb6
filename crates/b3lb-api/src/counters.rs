//! Named counter/gauge operations, so call sites read as domain events
//! rather than raw `upsert_metric` calls.

use b3lb_core::error::Result;
use b3lb_core::model::MetricName;
use b3lb_storage::Store;
use uuid::Uuid;

pub fn record_meeting_created(store: &Store, secret_uuid: Uuid, node_uuid: Uuid) -> Result<()> {
    store.upsert_metric(MetricName::MeetingsTotal, Some(secret_uuid), None, 1)?;
    store.upsert_metric(MetricName::MeetingsTotal, None, Some(node_uuid), 1)?;
    Ok(())
}

pub fn record_meeting_ended(store: &Store, secret_uuid: Uuid, duration_secs: i64) -> Result<()> {
    store.upsert_metric(
        MetricName::MeetingDurationSecondsCount,
        Some(secret_uuid),
        None,
        1,
    )?;
    store.upsert_metric(
        MetricName::MeetingDurationSecondsSum,
        Some(secret_uuid),
        None,
        duration_secs,
    )?;
    Ok(())
}

pub fn record_attendee_joined(store: &Store, secret_uuid: Uuid, node_uuid: Uuid) -> Result<()> {
    store.upsert_metric(MetricName::AttendeesTotal, Some(secret_uuid), None, 1)?;
    store.upsert_metric(MetricName::AttendeesTotal, None, Some(node_uuid), 1)?;
    Ok(())
}

pub fn record_attendee_limit_hit(store: &Store, secret_uuid: Uuid) -> Result<()> {
    store.upsert_metric(MetricName::AttendeeLimitHits, Some(secret_uuid), None, 1)
}

pub fn record_meeting_limit_hit(store: &Store, secret_uuid: Uuid) -> Result<()> {
    store.upsert_metric(MetricName::MeetingLimitHits, Some(secret_uuid), None, 1)
}

/// Gauges set from the latest node poll snapshot, scoped to a secret.
pub fn set_live_gauges(
    store: &Store,
    secret_uuid: Uuid,
    attendees: i64,
    listeners: i64,
    voices: i64,
    videos: i64,
    meetings: i64,
) -> Result<()> {
    store.upsert_metric(MetricName::Attendees, Some(secret_uuid), None, attendees)?;
    store.upsert_metric(MetricName::Listeners, Some(secret_uuid), None, listeners)?;
    store.upsert_metric(MetricName::Voices, Some(secret_uuid), None, voices)?;
    store.upsert_metric(MetricName::Videos, Some(secret_uuid), None, videos)?;
    store.upsert_metric(MetricName::Meetings, Some(secret_uuid), None, meetings)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meeting_created_increments_both_secret_and_node_totals() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let secret_uuid = Uuid::new_v4();
        let node_uuid = Uuid::new_v4();

        record_meeting_created(&store, secret_uuid, node_uuid).unwrap();
        record_meeting_created(&store, secret_uuid, node_uuid).unwrap();

        assert_eq!(
            store
                .get_metric(MetricName::MeetingsTotal, Some(secret_uuid), None)
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .get_metric(MetricName::MeetingsTotal, None, Some(node_uuid))
                .unwrap(),
            2
        );
    }

    #[test]
    fn live_gauges_overwrite_rather_than_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let secret_uuid = Uuid::new_v4();

        set_live_gauges(&store, secret_uuid, 5, 1, 1, 1, 2).unwrap();
        set_live_gauges(&store, secret_uuid, 3, 0, 0, 0, 1).unwrap();

        assert_eq!(
            store
                .get_metric(MetricName::Attendees, Some(secret_uuid), None)
                .unwrap(),
            3
        );
    }
}
