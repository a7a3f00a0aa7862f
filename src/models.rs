use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Closed role set, decoded once from the database row. Commands that need
/// admin rights check this enum, never the raw column text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn parse(raw: &str) -> anyhow::Result<Role> {
        match raw {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            other => bail!("unknown role '{other}' in users table"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct SessionView {
    pub id: Uuid,
    pub held_at: DateTime<Utc>,
    pub missed: bool,
}

/// One course offering as seen by one student: the offering's thresholds plus
/// its sessions with this student's declared misses folded into the flag.
#[derive(Debug, Clone)]
pub struct CourseOfferingView {
    pub offering_id: Uuid,
    pub course_code: String,
    pub course_title: String,
    pub required_attendance: f64,
    pub attendance_buffer: f64,
    pub sessions: Vec<SessionView>,
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: Uuid,
    pub title: String,
    pub deadline: DateTime<Utc>,
    pub importance: i32,
    pub estimated_duration_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskCategory {
    Failing,
    Critical,
    Warning,
    Safe,
}

impl RiskCategory {
    /// Sort rank: FAILING first, SAFE last.
    pub fn rank(self) -> u8 {
        match self {
            RiskCategory::Failing => 0,
            RiskCategory::Critical => 1,
            RiskCategory::Warning => 2,
            RiskCategory::Safe => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::Failing => "FAILING",
            RiskCategory::Critical => "CRITICAL",
            RiskCategory::Warning => "WARNING",
            RiskCategory::Safe => "SAFE",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCourseMetrics {
    pub offering_id: Uuid,
    pub course_code: String,
    pub course_title: String,
    pub total_sessions: usize,
    pub missed_sessions: usize,
    pub current_attendance: f64,
    pub requirement: f64,
    pub buffer: f64,
    pub remaining_allowable_misses: i64,
    pub attendance_deficit: f64,
    pub risk_category: RiskCategory,
}

/// The four component scores, each clamped to [0, 1].
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrgencyBreakdown {
    pub deadline_proximity: f64,
    pub task_importance: f64,
    pub next_class_proximity: f64,
    pub effort_fit: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrgentTask {
    pub id: Uuid,
    pub title: String,
    pub deadline: DateTime<Utc>,
    pub urgency_score: f64,
    pub components: UrgencyBreakdown,
}
