use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{RankedCourseMetrics, UrgentTask};

pub fn build_report(
    student_name: &str,
    now: DateTime<Utc>,
    next_class: Option<DateTime<Utc>>,
    courses: &[RankedCourseMetrics],
    tasks: &[UrgentTask],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance & Task Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        student_name,
        now.format("%Y-%m-%d %H:%M UTC")
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Next Class");
    match next_class {
        Some(at) => {
            let _ = writeln!(output, "{}", at.format("%Y-%m-%d %H:%M UTC"));
        }
        None => {
            let _ = writeln!(output, "No upcoming class sessions.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Course Risk");

    if courses.is_empty() {
        let _ = writeln!(output, "No enrollments found.");
    } else {
        for course in courses {
            let _ = writeln!(
                output,
                "- [{}] {} {}: attendance {:.0}% (required {:.0}%), missed {}/{}, {} allowable misses left",
                course.risk_category.as_str(),
                course.course_code,
                course.course_title,
                course.current_attendance * 100.0,
                course.requirement * 100.0,
                course.missed_sessions,
                course.total_sessions,
                course.remaining_allowable_misses
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Task Queue");

    if tasks.is_empty() {
        let _ = writeln!(output, "No open tasks.");
    } else {
        for task in tasks {
            let _ = writeln!(
                output,
                "- {} (due {}) urgency {:.3} [DP {:.2} / TI {:.2} / NCP {:.2} / EF {:.0}]",
                task.title,
                task.deadline.format("%Y-%m-%d %H:%M"),
                task.urgency_score,
                task.components.deadline_proximity,
                task.components.task_importance,
                task.components.next_class_proximity,
                task.components.effort_fit
            );
        }
    }

    output
}
