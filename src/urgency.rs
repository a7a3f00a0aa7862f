use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::models::{CourseOfferingView, TaskRecord, UrgencyBreakdown, UrgentTask};

const MS_PER_DAY: f64 = 86_400_000.0;
const MS_PER_MINUTE: f64 = 60_000.0;

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// The single nearest session strictly after `now` across every enrolled
/// offering. Ties on the same instant are immaterial; only the instant is
/// used downstream.
pub fn next_class_after(
    offerings: &[CourseOfferingView],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    offerings
        .iter()
        .flat_map(|offering| offering.sessions.iter())
        .map(|session| session.held_at)
        .filter(|held_at| *held_at > now)
        .min()
}

/// Score one task against the shared next-class instant and one config
/// snapshot. Every component lands in [0, 1]; with weights summing to 1 the
/// combined score does too.
pub fn evaluate_task(
    task: &TaskRecord,
    next_class: Option<DateTime<Utc>>,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> UrgencyBreakdown {
    let ms_to_deadline = (task.deadline - now).num_milliseconds() as f64;

    // Overdue tasks pin deadline proximity at 1 regardless of the window.
    let deadline_proximity = if ms_to_deadline < 0.0 {
        1.0
    } else {
        let window_ms = config.deadline_window_days as f64 * MS_PER_DAY;
        clamp_unit(1.0 - ms_to_deadline / window_ms)
    };

    // Importance is 0-10 by contract; the clamp guards bad rows.
    let task_importance = clamp_unit(task.importance as f64 / 10.0);

    let minutes_to_next_class =
        next_class.map(|at| (at - now).num_milliseconds() as f64 / MS_PER_MINUTE);

    // A task that cannot finish before the class starts gets no proximity
    // boost from it.
    let next_class_proximity = match minutes_to_next_class {
        Some(minutes) if task.estimated_duration_minutes as f64 <= minutes => {
            let window_minutes = config.next_class_window_hours as f64 * 60.0;
            clamp_unit(1.0 - minutes / window_minutes)
        }
        _ => 0.0,
    };

    // Effort fit is strictly binary: does the task fit in the tighter of the
    // deadline window and the gap before the next class?
    let mut available_minutes = ms_to_deadline / MS_PER_MINUTE;
    if let Some(minutes) = minutes_to_next_class {
        available_minutes = available_minutes.min(minutes);
    }
    let effort_fit = if available_minutes >= task.estimated_duration_minutes as f64 {
        1.0
    } else {
        0.0
    };

    UrgencyBreakdown {
        deadline_proximity,
        task_importance,
        next_class_proximity,
        effort_fit,
    }
}

pub fn combined_score(components: &UrgencyBreakdown, config: &ScoringConfig) -> f64 {
    config.weight_deadline * components.deadline_proximity
        + config.weight_importance * components.task_importance
        + config.weight_next_class * components.next_class_proximity
        + config.weight_effort_fit * components.effort_fit
}

/// Score every task and order by urgency descending. Equal scores fall back
/// to the earlier deadline; the stable sort keeps input order past that.
pub fn rank_tasks(
    tasks: &[TaskRecord],
    next_class: Option<DateTime<Utc>>,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> Vec<UrgentTask> {
    let mut ranked: Vec<UrgentTask> = tasks
        .iter()
        .map(|task| {
            let components = evaluate_task(task, next_class, config, now);
            UrgentTask {
                id: task.id,
                title: task.title.clone(),
                deadline: task.deadline,
                urgency_score: combined_score(&components, config),
                components,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.urgency_score
            .partial_cmp(&a.urgency_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.deadline.cmp(&b.deadline))
    });

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionView;
    use chrono::Duration;
    use uuid::Uuid;

    fn task(deadline_offset: Duration, importance: i32, duration_minutes: i32) -> TaskRecord {
        TaskRecord {
            id: Uuid::new_v4(),
            title: "Problem set".to_string(),
            deadline: Utc::now() + deadline_offset,
            importance,
            estimated_duration_minutes: duration_minutes,
        }
    }

    fn offering_with_sessions(offsets: &[Duration], now: DateTime<Utc>) -> CourseOfferingView {
        CourseOfferingView {
            offering_id: Uuid::new_v4(),
            course_code: "COSC 201".to_string(),
            course_title: "Data Structures".to_string(),
            required_attendance: 0.75,
            attendance_buffer: 0.10,
            sessions: offsets
                .iter()
                .map(|offset| SessionView {
                    id: Uuid::new_v4(),
                    held_at: now + *offset,
                    missed: false,
                })
                .collect(),
        }
    }

    #[test]
    fn next_class_is_global_minimum_future_session() {
        let now = Utc::now();
        let a = offering_with_sessions(&[Duration::hours(-2), Duration::hours(30)], now);
        let b = offering_with_sessions(&[Duration::hours(5), Duration::hours(50)], now);
        let next = next_class_after(&[a, b], now);
        assert_eq!(next, Some(now + Duration::hours(5)));
    }

    #[test]
    fn no_future_session_means_no_next_class() {
        let now = Utc::now();
        let past_only = offering_with_sessions(&[Duration::hours(-10)], now);
        assert_eq!(next_class_after(&[past_only], now), None);
        assert_eq!(next_class_after(&[], now), None);
    }

    #[test]
    fn overdue_deadline_pins_proximity_at_one() {
        let now = Utc::now();
        let overdue = task(Duration::days(-3), 5, 30);
        let components = evaluate_task(&overdue, None, &ScoringConfig::default(), now);
        assert_eq!(components.deadline_proximity, 1.0);
        // Overdue also means no time left, so the task cannot fit.
        assert_eq!(components.effort_fit, 0.0);
    }

    #[test]
    fn no_next_class_zeroes_proximity_component() {
        let now = Utc::now();
        let t = task(Duration::days(2), 10, 30);
        let components = evaluate_task(&t, None, &ScoringConfig::default(), now);
        assert_eq!(components.next_class_proximity, 0.0);
    }

    #[test]
    fn default_weights_scenario_matches_hand_computation() {
        // importance 10, 30 minute task, deadline in 2 days, no next class:
        // DP = 1 - 2/14, TI = 1, NCP = 0, EF = 1.
        let now = Utc::now();
        let t = task(Duration::days(2), 10, 30);
        let config = ScoringConfig::default();
        let components = evaluate_task(&t, None, &config, now);

        assert!((components.deadline_proximity - (1.0 - 2.0 / 14.0)).abs() < 1e-6);
        assert_eq!(components.task_importance, 1.0);
        assert_eq!(components.next_class_proximity, 0.0);
        assert_eq!(components.effort_fit, 1.0);

        let score = combined_score(&components, &config);
        assert!((score - 0.642_857).abs() < 1e-3);
    }

    #[test]
    fn task_longer_than_gap_gets_no_class_proximity() {
        let now = Utc::now();
        let next_class = Some(now + Duration::minutes(45));
        let long_task = task(Duration::days(2), 5, 90);
        let components = evaluate_task(&long_task, next_class, &ScoringConfig::default(), now);
        assert_eq!(components.next_class_proximity, 0.0);
        // 45 minutes is also the available window, so a 90 minute task
        // cannot fit.
        assert_eq!(components.effort_fit, 0.0);
    }

    #[test]
    fn close_class_raises_proximity_for_short_task() {
        let now = Utc::now();
        // Class in 3 hours, window 6 hours: NCP = 1 - 180/360 = 0.5.
        let next_class = Some(now + Duration::hours(3));
        let short_task = task(Duration::days(2), 5, 30);
        let components = evaluate_task(&short_task, next_class, &ScoringConfig::default(), now);
        assert!((components.next_class_proximity - 0.5).abs() < 1e-6);
        assert_eq!(components.effort_fit, 1.0);
    }

    #[test]
    fn distant_class_clamps_proximity_to_zero() {
        let now = Utc::now();
        let next_class = Some(now + Duration::hours(12));
        let t = task(Duration::days(2), 5, 30);
        let components = evaluate_task(&t, next_class, &ScoringConfig::default(), now);
        assert_eq!(components.next_class_proximity, 0.0);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let now = Utc::now();
        let config = ScoringConfig::default();
        let cases = [
            task(Duration::days(-5), 10, 600),
            task(Duration::minutes(10), 0, 5),
            task(Duration::days(30), 7, 120),
        ];
        let next_class = Some(now + Duration::hours(2));
        for t in &cases {
            let components = evaluate_task(t, next_class, &config, now);
            let score = combined_score(&components, &config);
            assert!((0.0..=1.0).contains(&score), "score {score} out of range");
        }
    }

    #[test]
    fn ranking_orders_by_score_then_deadline() {
        let now = Utc::now();
        let config = ScoringConfig::default();

        let urgent = task(Duration::days(1), 9, 30);
        let relaxed = task(Duration::days(10), 2, 30);
        let ranked = rank_tasks(&[relaxed.clone(), urgent.clone()], None, &config, now);
        assert_eq!(ranked[0].id, urgent.id);
        assert_eq!(ranked[1].id, relaxed.id);

        // Both deadlines sit past the 14 day window, so DP clamps to 0 and
        // the scores tie exactly; the earlier deadline wins the tie.
        let later = task(Duration::days(30), 5, 30);
        let earlier = task(Duration::days(20), 5, 30);
        let ranked = rank_tasks(&[later.clone(), earlier.clone()], None, &config, now);
        assert_eq!(ranked[0].urgency_score, ranked[1].urgency_score);
        assert_eq!(ranked[0].id, earlier.id);
    }

    #[test]
    fn empty_task_list_ranks_to_empty() {
        let ranked = rank_tasks(&[], None, &ScoringConfig::default(), Utc::now());
        assert!(ranked.is_empty());
    }
}
