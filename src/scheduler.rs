//! Cron scheduler — fires due automations.
//!
//! A single ticker polls the registry every `tick_interval` and spawns a
//! pipeline run for each active automation whose cron schedule fired inside
//! the window since the previous tick. Missed windows (process down) are not
//! replayed.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::pipeline::AutomationRunner;
use crate::registry::AutomationRegistry;

pub struct Scheduler {
    registry: Arc<dyn AutomationRegistry>,
    runner: Arc<AutomationRunner>,
    config: SchedulerConfig,
    last_tick: Mutex<DateTime<Utc>>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<dyn AutomationRegistry>,
        runner: Arc<AutomationRunner>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            runner,
            config,
            last_tick: Mutex::new(Utc::now()),
        })
    }

    /// Check all automations once and spawn runs for those due.
    /// Returns the number of runs fired.
    pub async fn check_due(&self) -> usize {
        let now = Utc::now();
        let window_start = {
            let mut last = self.last_tick.lock().await;
            std::mem::replace(&mut *last, now)
        };

        let automations = match self.registry.list().await {
            Ok(automations) => automations,
            Err(e) => {
                error!(error = %e, "Failed to list automations");
                return 0;
            }
        };

        let mut fired = 0;
        for automation in automations {
            if !automation.is_active() {
                continue;
            }
            let Some(ref schedule) = automation.schedule else {
                continue;
            };
            match fired_in_window(schedule, window_start, now) {
                Ok(true) => {
                    info!(automation = %automation.id, "Schedule due; firing");
                    let runner = self.runner.clone();
                    let id = automation.id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = runner.run(&id).await {
                            error!(automation = %id, error = %e, "Scheduled run failed");
                        }
                    });
                    fired += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(automation = %automation.id, "Unusable schedule: {e}");
                }
            }
        }
        fired
    }

    /// Spawn the ticker loop.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.tick_interval);
            // Skip immediate first tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.check_due().await;
            }
        })
    }
}

/// Whether a cron schedule has a fire time in `(window_start, now]`.
fn fired_in_window(
    schedule: &str,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool, String> {
    let schedule = cron::Schedule::from_str(schedule).map_err(|e| e.to_string())?;
    Ok(schedule
        .after(&window_start)
        .next()
        .is_some_and(|fire| fire <= now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn every_second_fires_in_any_window() {
        let now = Utc::now();
        let fired = fired_in_window("* * * * * *", now - Duration::seconds(30), now).unwrap();
        assert!(fired);
    }

    #[test]
    fn daily_schedule_outside_window() {
        // 09:00 daily; a 1-second window almost never contains it. Anchor
        // the window far from 09:00 to keep this deterministic.
        let start = Utc::now()
            .date_naive()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc();
        let fired = fired_in_window("0 0 9 * * * *", start, start + Duration::seconds(1)).unwrap();
        assert!(!fired);
    }

    #[test]
    fn daily_schedule_inside_window() {
        let start = Utc::now()
            .date_naive()
            .and_hms_opt(8, 59, 0)
            .unwrap()
            .and_utc();
        let fired = fired_in_window("0 0 9 * * * *", start, start + Duration::minutes(2)).unwrap();
        assert!(fired);
    }

    #[test]
    fn invalid_schedule_is_an_error() {
        let now = Utc::now();
        assert!(fired_in_window("nope", now, now).is_err());
    }
}
