use std::cmp::Ordering;

use crate::models::{CourseOfferingView, RankedCourseMetrics, RiskCategory};

/// Derive attendance metrics and the risk category for one offering.
///
/// The category decision is a priority cascade, first match wins:
/// a blown misses budget means FAILING even when the attendance fraction
/// still clears the requirement, so the budget check must run first.
pub fn evaluate_offering(view: &CourseOfferingView) -> RankedCourseMetrics {
    let total_sessions = view.sessions.len();
    let missed_sessions = view.sessions.iter().filter(|s| s.missed).count();

    // Zero planned sessions counts as full attendance, never a division error.
    let current_attendance = if total_sessions > 0 {
        1.0 - missed_sessions as f64 / total_sessions as f64
    } else {
        1.0
    };

    let requirement = view.required_attendance;
    let buffer = view.attendance_buffer;
    let attendance_deficit = (requirement - current_attendance).max(0.0);

    let max_allowed_misses = (total_sessions as f64 * (1.0 - requirement)).floor() as i64;
    let remaining_allowable_misses = max_allowed_misses - missed_sessions as i64;

    let risk_category = if remaining_allowable_misses < 0 {
        RiskCategory::Failing
    } else if current_attendance < requirement {
        RiskCategory::Critical
    } else if current_attendance < requirement + buffer {
        RiskCategory::Warning
    } else {
        RiskCategory::Safe
    };

    RankedCourseMetrics {
        offering_id: view.offering_id,
        course_code: view.course_code.clone(),
        course_title: view.course_title.clone(),
        total_sessions,
        missed_sessions,
        current_attendance,
        requirement,
        buffer,
        remaining_allowable_misses,
        attendance_deficit,
        risk_category,
    }
}

/// Evaluate every offering and order the results: worst category first, then
/// fewest remaining allowable misses, then largest deficit. The sort is
/// stable, so full ties keep their input order.
pub fn rank_courses(views: &[CourseOfferingView]) -> Vec<RankedCourseMetrics> {
    let mut ranked: Vec<RankedCourseMetrics> = views.iter().map(evaluate_offering).collect();

    ranked.sort_by(|a, b| {
        a.risk_category
            .rank()
            .cmp(&b.risk_category.rank())
            .then_with(|| a.remaining_allowable_misses.cmp(&b.remaining_allowable_misses))
            .then_with(|| {
                b.attendance_deficit
                    .partial_cmp(&a.attendance_deficit)
                    .unwrap_or(Ordering::Equal)
            })
    });

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionView;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn offering(
        code: &str,
        total: usize,
        missed: usize,
        requirement: f64,
        buffer: f64,
    ) -> CourseOfferingView {
        let start = Utc::now() - Duration::days(30);
        let sessions = (0..total)
            .map(|i| SessionView {
                id: Uuid::new_v4(),
                held_at: start + Duration::days(2 * i as i64),
                missed: i < missed,
            })
            .collect();
        CourseOfferingView {
            offering_id: Uuid::new_v4(),
            course_code: code.to_string(),
            course_title: format!("{code} title"),
            required_attendance: requirement,
            attendance_buffer: buffer,
            sessions,
        }
    }

    #[test]
    fn zero_sessions_is_fully_safe() {
        let metrics = evaluate_offering(&offering("COSC 201", 0, 0, 0.75, 0.10));
        assert_eq!(metrics.current_attendance, 1.0);
        assert_eq!(metrics.risk_category, RiskCategory::Safe);
        assert_eq!(metrics.remaining_allowable_misses, 0);
    }

    #[test]
    fn blown_misses_budget_is_failing() {
        // 20 sessions, 6 missed, requirement 0.75: budget floor(20 * 0.25) = 5.
        let metrics = evaluate_offering(&offering("COSC 201", 20, 6, 0.75, 0.10));
        assert!((metrics.current_attendance - 0.70).abs() < 1e-9);
        assert_eq!(metrics.remaining_allowable_misses, -1);
        assert_eq!(metrics.risk_category, RiskCategory::Failing);
    }

    #[test]
    fn inside_buffer_is_warning() {
        // Same offering, 4 missed: attendance 0.80, budget remaining 1,
        // 0.75 <= 0.80 < 0.85.
        let metrics = evaluate_offering(&offering("COSC 201", 20, 4, 0.75, 0.10));
        assert!((metrics.current_attendance - 0.80).abs() < 1e-9);
        assert_eq!(metrics.remaining_allowable_misses, 1);
        assert_eq!(metrics.risk_category, RiskCategory::Warning);
    }

    #[test]
    fn clear_of_buffer_is_safe() {
        let metrics = evaluate_offering(&offering("COSC 201", 20, 1, 0.75, 0.10));
        assert!((metrics.current_attendance - 0.95).abs() < 1e-9);
        assert_eq!(metrics.risk_category, RiskCategory::Safe);
    }

    #[test]
    fn budget_check_runs_before_attendance_check() {
        // Attendance below requirement always coincides with a blown misses
        // budget for exact counts (m > n*(1-r) whenever 1 - m/n < r), so the
        // cascade must report FAILING here, not CRITICAL.
        let metrics = evaluate_offering(&offering("EDGE 1", 10, 3, 0.75, 0.10));
        assert!(metrics.current_attendance < 0.75);
        assert_eq!(metrics.remaining_allowable_misses, -1);
        assert_eq!(metrics.risk_category, RiskCategory::Failing);
    }

    #[test]
    fn failing_outranks_critical_in_sort() {
        // A blown budget must classify as FAILING before the secondary sort
        // key is ever consulted.
        let views = vec![
            offering("WARN", 20, 4, 0.75, 0.10),
            offering("FAIL", 20, 6, 0.75, 0.10),
            offering("SAFE", 20, 0, 0.75, 0.10),
        ];
        let ranked = rank_courses(&views);
        assert_eq!(ranked[0].course_code, "FAIL");
        assert_eq!(ranked[0].risk_category, RiskCategory::Failing);
        assert_eq!(ranked[1].course_code, "WARN");
        assert_eq!(ranked[2].course_code, "SAFE");
    }

    #[test]
    fn ties_break_on_remaining_misses_then_deficit() {
        // Both WARNING; fewer remaining allowable misses sorts first.
        let tight = offering("TIGHT", 20, 5, 0.75, 0.10); // remaining 0
        let loose = offering("LOOSE", 20, 4, 0.75, 0.10); // remaining 1
        let ranked = rank_courses(&[loose, tight]);
        assert_eq!(ranked[0].course_code, "TIGHT");
        assert_eq!(ranked[1].course_code, "LOOSE");
    }

    #[test]
    fn full_ties_keep_input_order() {
        let a = offering("A", 20, 0, 0.75, 0.10);
        let b = offering("B", 20, 0, 0.75, 0.10);
        let ranked = rank_courses(&[a, b]);
        assert_eq!(ranked[0].course_code, "A");
        assert_eq!(ranked[1].course_code, "B");
    }
}
