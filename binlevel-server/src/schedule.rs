use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use tracing::{error, info};

use binlevel_core::{SamplingService, Trigger};

/// Next time the hourly pass fires strictly after `now`, `minute` minutes past the hour.
pub(crate) fn next_fire_after(now: DateTime<Utc>, minute: u32) -> DateTime<Utc> {
    let hour_start = now
        .with_minute(0)
        .and_then(|time| time.with_second(0))
        .and_then(|time| time.with_nanosecond(0))
        .unwrap_or(now);
    let candidate = hour_start + TimeDelta::minutes(i64::from(minute % 60));

    if candidate > now {
        candidate
    } else {
        candidate + TimeDelta::hours(1)
    }
}

/// Run one scheduled pass; failures end up in the log only.
pub(crate) async fn scheduled_pass(service: &SamplingService) {
    info!(started_at = %Utc::now(), "Scheduled pass started");
    if let Err(err) = service.run_pass(Trigger::Scheduled).await {
        error!(error = %err, "Error in scheduled pass");
    }
}

/// Fire a pass every hour at `minute` past, for as long as the process runs.
pub(crate) async fn run(service: Arc<SamplingService>, minute: u32) {
    loop {
        let now = Utc::now();
        let next = next_fire_after(now, minute);
        info!(next = %next, "Next scheduled pass");

        tokio::time::sleep((next - now).to_std().unwrap_or(Duration::ZERO)).await;
        scheduled_pass(&service).await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use binlevel_core::memory::{MemoryRecords, MemoryTelemetry};
    use binlevel_core::{SamplerOptions, StorePlugin};

    use super::*;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, hour, minute, second)
            .single()
            .expect("valid time")
    }

    #[test]
    fn fires_at_next_top_of_hour() {
        assert_eq!(next_fire_after(at(9, 17, 42), 0), at(10, 0, 0));
        assert_eq!(next_fire_after(at(9, 59, 59), 0), at(10, 0, 0));
    }

    #[test]
    fn exact_fire_time_moves_to_following_hour() {
        assert_eq!(next_fire_after(at(10, 0, 0), 0), at(11, 0, 0));
    }

    #[test]
    fn minute_offset_within_current_hour() {
        assert_eq!(next_fire_after(at(9, 10, 0), 15), at(9, 15, 0));
        assert_eq!(next_fire_after(at(9, 20, 0), 15), at(10, 15, 0));
    }

    #[test]
    fn rolls_over_midnight() {
        let next = next_fire_after(at(23, 30, 0), 0);
        assert_eq!(
            next,
            Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0)
                .single()
                .expect("valid time")
        );
    }

    #[tokio::test]
    async fn scheduled_pass_records_levels() {
        let records = Arc::new(MemoryRecords::new());
        let plugin = StorePlugin {
            name: "memory",
            telemetry: Arc::new(MemoryTelemetry::with_bins([(
                "bin1",
                json!({ "distance(cm)": 51 }),
            )])),
            records: records.clone(),
        };
        let service = SamplingService::new(plugin, SamplerOptions::default());

        scheduled_pass(&service).await;

        let stored = records.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].trash_level.percent(), 50);
    }
}
