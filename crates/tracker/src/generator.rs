//! Background generation of recurring task instances.
//!
//! Each tick scans for templates whose `next_run` has passed, spawns one
//! concrete task per due occurrence, advances the template, and then sends
//! due-soon reminders. Instances are unique per (template, occurrence), so a
//! tick interrupted between inserting instances and saving the template is
//! safe to repeat. The generator only ever writes the fields it owns (the
//! template schedule and the reminder flag), so edits made through the API
//! during a tick are never overwritten.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::Serialize;
use taskhub_core::{ResultExt, SchedulerConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::notify::{Notification, NotificationHub, NotificationKind};
use crate::store::TaskStore;
use crate::types::{Task, TaskId, TaskStatus};

const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Settings for the generator loop.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub tick_interval: Duration,
    pub max_catch_up: usize,
    pub due_soon_window: Duration,
    pub max_backoff: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for GeneratorConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            max_catch_up: config.max_catch_up,
            due_soon_window: config.due_soon_window,
            max_backoff: config.max_backoff,
        }
    }
}

/// Exponential backoff with jitter for consecutive failed ticks.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter_factor: f64,
}

impl Backoff {
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Delay after `failures` consecutive failures.
    ///
    /// `base * 2^(failures - 1)` plus jitter, never more than `max`.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let factor = 2_u64.saturating_pow(failures.saturating_sub(1));
        let capped = base_ms.saturating_mul(factor).min(max_ms);

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let jitter_ms = if self.jitter_factor > 0.0 && capped > 0 {
            let range = (capped as f64) * self.jitter_factor;
            rand::thread_rng().gen_range(0.0..range).floor() as u64
        } else {
            0
        };

        Duration::from_millis(capped.saturating_add(jitter_ms).min(max_ms))
    }
}

/// Counters from one generator pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenerationSummary {
    pub templates_processed: usize,
    pub templates_failed: usize,
    pub instances_created: usize,
    pub duplicates_skipped: usize,
    pub due_soon_notified: usize,
}

impl GenerationSummary {
    const fn is_idle(&self) -> bool {
        self.templates_processed == 0 && self.due_soon_notified == 0
    }
}

/// Spawns instances of recurring templates.
pub struct RecurrenceGenerator {
    store: Arc<dyn TaskStore>,
    hub: NotificationHub,
    clock: Arc<dyn Clock>,
    config: GeneratorConfig,
    backoff: Backoff,
}

impl RecurrenceGenerator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        hub: NotificationHub,
        clock: Arc<dyn Clock>,
        config: GeneratorConfig,
    ) -> Self {
        let backoff = Backoff::new(config.tick_interval, config.max_backoff);
        Self {
            store,
            hub,
            clock,
            config,
            backoff,
        }
    }

    /// One pass over due templates and due-soon tasks at `now`.
    ///
    /// A template that fails is logged and counted; the pass continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot list due templates or due tasks.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<GenerationSummary> {
        let mut summary = GenerationSummary::default();

        for template in self.store.due_templates(now).await? {
            let template_id = template.id;
            match self.generate_for(template, now).await {
                Ok((created, skipped)) => {
                    summary.templates_processed = summary.templates_processed.saturating_add(1);
                    summary.instances_created = summary.instances_created.saturating_add(created);
                    summary.duplicates_skipped = summary.duplicates_skipped.saturating_add(skipped);
                }
                Err(e) => {
                    warn!(task_id = %template_id, error = %e, "Failed to generate instances");
                    summary.templates_failed = summary.templates_failed.saturating_add(1);
                }
            }
        }

        summary.due_soon_notified = self.notify_due_soon(now).await?;
        Ok(summary)
    }

    async fn generate_for(&self, template: Task, now: DateTime<Utc>) -> Result<(usize, usize)> {
        let Some(expected) = template.recurrence.clone() else {
            return Ok((0, 0));
        };
        let mut recurrence = expected.clone();
        let occurrences = recurrence.advance(now, self.config.max_catch_up);
        let offset = template
            .due_date
            .map(|due| due.signed_duration_since(recurrence.start));

        let mut created = 0_usize;
        let mut skipped = 0_usize;
        for occurrence in occurrences {
            let instance = instance_of(&template, occurrence, offset, now);
            if self.store.insert_instance(instance.clone()).await? {
                created = created.saturating_add(1);
                let recipient = instance.assigned_to.unwrap_or(instance.created_by);
                let message = format!("New occurrence of '{}' was created", instance.title);
                self.hub
                    .publish(Notification::about(
                        &instance,
                        recipient,
                        NotificationKind::RecurringInstanceCreated,
                        message,
                        now,
                    ))
                    .await
                    .into_option_logged();
            } else {
                skipped = skipped.saturating_add(1);
            }
        }

        let next_run = recurrence.next_run;
        if self
            .store
            .advance_recurrence(template.id, &expected, recurrence)
            .await?
        {
            debug!(
                task_id = %template.id,
                created,
                skipped,
                next_run = ?next_run,
                "Advanced recurring template"
            );
        } else {
            debug!(task_id = %template.id, "Template changed during tick, schedule left as edited");
        }
        Ok((created, skipped))
    }

    async fn notify_due_soon(&self, now: DateTime<Utc>) -> Result<usize> {
        let window = TimeDelta::from_std(self.config.due_soon_window).unwrap_or(TimeDelta::MAX);
        let until = now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut notified = 0_usize;
        for candidate in self.store.due_soon(now, until).await? {
            let Some(due) = candidate.due_date else {
                continue;
            };
            // Marked before publishing so a reminder is never sent twice
            let Some(task) = self
                .store
                .mark_due_soon_notified(candidate.id, due)
                .await
                .into_option_logged()
                .flatten()
            else {
                continue;
            };
            let recipient = task.assigned_to.unwrap_or(task.created_by);
            let message = format!("'{}' is due at {}", task.title, due.to_rfc3339());
            let published = self
                .hub
                .publish(Notification::about(
                    &task,
                    recipient,
                    NotificationKind::TaskDueSoon,
                    message,
                    now,
                ))
                .await
                .into_option_logged();
            if published.is_some() {
                notified = notified.saturating_add(1);
            }
        }
        Ok(notified)
    }

    /// Run the generator until `shutdown` flips to `true` or its sender drops.
    ///
    /// Ticks every `tick_interval`; consecutive failed passes back off up to
    /// `max_backoff`.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                tick_interval_secs = self.config.tick_interval.as_secs(),
                max_catch_up = self.config.max_catch_up,
                "Recurrence generator starting"
            );
            let mut failures = 0_u32;

            loop {
                if *shutdown.borrow() {
                    break;
                }

                let delay = match self.run_once(self.clock.now()).await {
                    Ok(summary) => {
                        failures = 0;
                        if summary.is_idle() {
                            debug!("Recurrence tick found nothing to do");
                        } else {
                            info!(
                                templates = summary.templates_processed,
                                failed = summary.templates_failed,
                                created = summary.instances_created,
                                duplicates = summary.duplicates_skipped,
                                due_soon = summary.due_soon_notified,
                                "Recurrence tick complete"
                            );
                        }
                        self.config.tick_interval
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let delay = self.backoff.delay(failures);
                        warn!(
                            error = %e,
                            failures,
                            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Recurrence tick failed"
                        );
                        delay
                    }
                };

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            info!("Recurrence generator stopped");
        })
    }
}

fn instance_of(
    template: &Task,
    occurrence: DateTime<Utc>,
    due_offset: Option<TimeDelta>,
    now: DateTime<Utc>,
) -> Task {
    let due_date = due_offset
        .and_then(|offset| occurrence.checked_add_signed(offset))
        .unwrap_or(occurrence);
    Task {
        id: TaskId::new(),
        tenant_id: template.tenant_id,
        title: template.title.clone(),
        description: template.description.clone(),
        status: TaskStatus::Todo,
        priority: template.priority,
        created_by: template.created_by,
        assigned_to: template.assigned_to,
        due_date: Some(due_date),
        recurrence: None,
        parent_id: Some(template.id),
        occurrence: Some(occurrence),
        created_at: now,
        updated_at: now,
        completed_at: None,
        due_soon_notified: false,
    }
}
