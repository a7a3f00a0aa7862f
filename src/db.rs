use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::models::{CourseOfferingView, Role, SessionView, TaskRecord, UserRecord};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn find_user(pool: &PgPool, email: &str) -> anyhow::Result<UserRecord> {
    let row = sqlx::query(
        "SELECT id, full_name, email, role FROM attendance_planner.users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no user with email {email}"))?;

    Ok(UserRecord {
        id: row.get("id"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        role: Role::parse(row.get::<String, _>("role").as_str())?,
    })
}

pub async fn require_admin(pool: &PgPool, email: &str) -> anyhow::Result<UserRecord> {
    let user = find_user(pool, email).await?;
    if user.role != Role::Admin {
        bail!("{email} has role '{}', admin required", user.role.as_str());
    }
    Ok(user)
}

pub async fn require_student(pool: &PgPool, email: &str) -> anyhow::Result<UserRecord> {
    let user = find_user(pool, email).await?;
    if user.role != Role::Student {
        bail!("{email} has role '{}', student required", user.role.as_str());
    }
    Ok(user)
}

/// Fetch every offering the student is enrolled in, with sessions and this
/// student's declared misses folded into the missed flag.
pub async fn fetch_offerings(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<CourseOfferingView>> {
    let rows = sqlx::query(
        "SELECT o.id AS offering_id, c.code, c.title, \
         o.required_attendance, o.attendance_buffer, \
         s.id AS session_id, s.held_at, \
         (dm.id IS NOT NULL) AS missed \
         FROM attendance_planner.enrollments e \
         JOIN attendance_planner.course_offerings o ON o.id = e.offering_id \
         JOIN attendance_planner.courses c ON c.id = o.course_id \
         LEFT JOIN attendance_planner.attendance_sessions s ON s.offering_id = o.id \
         LEFT JOIN attendance_planner.declared_misses dm \
         ON dm.session_id = s.id AND dm.student_id = e.student_id \
         WHERE e.student_id = $1 \
         ORDER BY c.code, o.id, s.held_at",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut offerings: Vec<CourseOfferingView> = Vec::new();

    for row in rows {
        let offering_id: Uuid = row.get("offering_id");
        if offerings.last().map(|o| o.offering_id) != Some(offering_id) {
            offerings.push(CourseOfferingView {
                offering_id,
                course_code: row.get("code"),
                course_title: row.get("title"),
                required_attendance: row.get("required_attendance"),
                attendance_buffer: row.get("attendance_buffer"),
                sessions: Vec::new(),
            });
        }

        // The LEFT JOIN yields a null session for offerings with none yet.
        if let Some(session_id) = row.get::<Option<Uuid>, _>("session_id") {
            if let Some(offering) = offerings.last_mut() {
                offering.sessions.push(SessionView {
                    id: session_id,
                    held_at: row.get("held_at"),
                    missed: row.get("missed"),
                });
            }
        }
    }

    Ok(offerings)
}

pub async fn fetch_open_tasks(pool: &PgPool, student_id: Uuid) -> anyhow::Result<Vec<TaskRecord>> {
    let rows = sqlx::query(
        "SELECT id, title, deadline, importance, estimated_duration_minutes \
         FROM attendance_planner.tasks \
         WHERE student_id = $1 AND is_completed = FALSE \
         ORDER BY deadline",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(TaskRecord {
            id: row.get("id"),
            title: row.get("title"),
            deadline: row.get("deadline"),
            importance: row.get("importance"),
            estimated_duration_minutes: row.get("estimated_duration_minutes"),
        });
    }

    Ok(tasks)
}

pub async fn fetch_config(pool: &PgPool) -> anyhow::Result<Option<ScoringConfig>> {
    let row = sqlx::query(
        "SELECT weight_deadline, weight_importance, weight_next_class, weight_effort_fit, \
         deadline_window_days, next_class_window_hours \
         FROM attendance_planner.scoring_config WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| ScoringConfig {
        weight_deadline: row.get("weight_deadline"),
        weight_importance: row.get("weight_importance"),
        weight_next_class: row.get("weight_next_class"),
        weight_effort_fit: row.get("weight_effort_fit"),
        deadline_window_days: row.get("deadline_window_days"),
        next_class_window_hours: row.get("next_class_window_hours"),
    }))
}

/// Persist a validated config. Validation happens before the write; an
/// invalid config is rejected whole, never clamped or partially saved.
pub async fn save_config(pool: &PgPool, config: &ScoringConfig) -> anyhow::Result<()> {
    config.validate()?;

    sqlx::query(
        "INSERT INTO attendance_planner.scoring_config \
         (id, weight_deadline, weight_importance, weight_next_class, weight_effort_fit, \
         deadline_window_days, next_class_window_hours) \
         VALUES (1, $1, $2, $3, $4, $5, $6) \
         ON CONFLICT (id) DO UPDATE SET \
         weight_deadline = EXCLUDED.weight_deadline, \
         weight_importance = EXCLUDED.weight_importance, \
         weight_next_class = EXCLUDED.weight_next_class, \
         weight_effort_fit = EXCLUDED.weight_effort_fit, \
         deadline_window_days = EXCLUDED.deadline_window_days, \
         next_class_window_hours = EXCLUDED.next_class_window_hours",
    )
    .bind(config.weight_deadline)
    .bind(config.weight_importance)
    .bind(config.weight_next_class)
    .bind(config.weight_effort_fit)
    .bind(config.deadline_window_days)
    .bind(config.next_class_window_hours)
    .execute(pool)
    .await?;

    Ok(())
}

/// Declare a miss for a session, or retract it if one already exists.
/// Returns true when a miss was declared, false when retracted.
pub async fn toggle_declared_miss(
    pool: &PgPool,
    session_id: Uuid,
    student_id: Uuid,
    reason: &str,
) -> anyhow::Result<bool> {
    let existing = sqlx::query(
        "SELECT id FROM attendance_planner.declared_misses \
         WHERE session_id = $1 AND student_id = $2",
    )
    .bind(session_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    if let Some(row) = existing {
        sqlx::query("DELETE FROM attendance_planner.declared_misses WHERE id = $1")
            .bind(row.get::<Uuid, _>("id"))
            .execute(pool)
            .await?;
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO attendance_planner.declared_misses (id, session_id, student_id, reason) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(student_id)
    .bind(reason)
    .execute(pool)
    .await
    .context("failed to declare miss; does the session exist?")?;

    Ok(true)
}

/// Create a course and immediately offer it for the given semester, the way
/// the admin workflow expects. Absent thresholds fall back to the schema
/// defaults. Returns (course id, offering id).
pub async fn add_course(
    pool: &PgPool,
    code: &str,
    title: &str,
    credits: i32,
    semester: &str,
    required_attendance: Option<f64>,
    attendance_buffer: Option<f64>,
) -> anyhow::Result<(Uuid, Uuid)> {
    for (name, value) in [
        ("required-attendance", required_attendance),
        ("attendance-buffer", attendance_buffer),
    ] {
        if let Some(value) = value {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be between 0 and 1, got {value}");
            }
        }
    }

    let course_id: Uuid = sqlx::query(
        "INSERT INTO attendance_planner.courses (id, code, title, credits) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (code) DO UPDATE \
         SET title = EXCLUDED.title, credits = EXCLUDED.credits \
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(code)
    .bind(title)
    .bind(credits)
    .fetch_one(pool)
    .await?
    .get("id");

    // COALESCE onto the same defaults the column definitions carry.
    let offering_id: Uuid = sqlx::query(
        "INSERT INTO attendance_planner.course_offerings \
         (id, course_id, semester, required_attendance, attendance_buffer) \
         VALUES ($1, $2, $3, COALESCE($4, 0.75), COALESCE($5, 0.10)) \
         ON CONFLICT (course_id, semester) DO UPDATE \
         SET required_attendance = COALESCE($4, course_offerings.required_attendance), \
         attendance_buffer = COALESCE($5, course_offerings.attendance_buffer) \
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(course_id)
    .bind(semester)
    .bind(required_attendance)
    .bind(attendance_buffer)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok((course_id, offering_id))
}

/// Schedule an attendance session for the offering of `course_code` in
/// `semester`.
pub async fn add_session(
    pool: &PgPool,
    course_code: &str,
    semester: &str,
    held_at: DateTime<Utc>,
) -> anyhow::Result<Uuid> {
    let offering_id: Uuid = sqlx::query(
        "SELECT o.id FROM attendance_planner.course_offerings o \
         JOIN attendance_planner.courses c ON c.id = o.course_id \
         WHERE c.code = $1 AND o.semester = $2",
    )
    .bind(course_code)
    .bind(semester)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no offering of {course_code} in semester {semester}"))?
    .get("id");

    let session_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO attendance_planner.attendance_sessions (id, offering_id, held_at) \
         VALUES ($1, $2, $3)",
    )
    .bind(session_id)
    .bind(offering_id)
    .bind(held_at)
    .execute(pool)
    .await?;

    Ok(session_id)
}

pub async fn add_task(
    pool: &PgPool,
    student_id: Uuid,
    title: &str,
    deadline: DateTime<Utc>,
    importance: i32,
    estimated_duration_minutes: i32,
) -> anyhow::Result<Uuid> {
    if !(0..=10).contains(&importance) {
        bail!("importance must be between 0 and 10, got {importance}");
    }
    if estimated_duration_minutes <= 0 {
        bail!("duration must be positive, got {estimated_duration_minutes} minutes");
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO attendance_planner.tasks \
         (id, student_id, title, deadline, importance, estimated_duration_minutes) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(student_id)
    .bind(title)
    .bind(deadline)
    .bind(importance)
    .bind(estimated_duration_minutes)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn complete_task(pool: &PgPool, student_id: Uuid, task_id: Uuid) -> anyhow::Result<()> {
    let result = sqlx::query(
        "UPDATE attendance_planner.tasks SET is_completed = TRUE \
         WHERE id = $1 AND student_id = $2",
    )
    .bind(task_id)
    .bind(student_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        bail!("no task {task_id} for this student");
    }
    Ok(())
}

pub async fn import_tasks_csv(
    pool: &PgPool,
    student_id: Uuid,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        title: String,
        deadline: DateTime<Utc>,
        importance: i32,
        estimated_duration_minutes: i32,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        add_task(
            pool,
            student_id,
            &row.title,
            row.deadline,
            row.importance,
            row.estimated_duration_minutes,
        )
        .await?;
        inserted += 1;
    }

    Ok(inserted)
}

pub struct AdminStats {
    pub students: i64,
    pub courses: i64,
    pub sessions: i64,
    pub open_tasks: i64,
}

pub async fn admin_stats(pool: &PgPool) -> anyhow::Result<AdminStats> {
    let row = sqlx::query(
        "SELECT \
         (SELECT COUNT(*) FROM attendance_planner.users WHERE role = 'student') AS students, \
         (SELECT COUNT(*) FROM attendance_planner.courses) AS courses, \
         (SELECT COUNT(*) FROM attendance_planner.attendance_sessions) AS sessions, \
         (SELECT COUNT(*) FROM attendance_planner.tasks WHERE is_completed = FALSE) AS open_tasks",
    )
    .fetch_one(pool)
    .await?;

    Ok(AdminStats {
        students: row.get("students"),
        courses: row.get("courses"),
        sessions: row.get("sessions"),
        open_tasks: row.get("open_tasks"),
    })
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = vec![
        (
            Uuid::parse_str("8a1f2b3c-4d5e-4f60-8172-93a4b5c6d7e8")?,
            "Ada Okafor",
            "ada.okafor@example.edu",
            "admin",
        ),
        (
            Uuid::parse_str("1b2c3d4e-5f60-4718-92a3-b4c5d6e7f809")?,
            "John Mensah",
            "john.mensah@example.edu",
            "student",
        ),
    ];

    for (id, name, email, role) in users {
        sqlx::query(
            "INSERT INTO attendance_planner.users (id, full_name, email, role) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (email) DO UPDATE \
             SET full_name = EXCLUDED.full_name, role = EXCLUDED.role",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(role)
        .execute(pool)
        .await?;
    }

    let student_id = Uuid::parse_str("1b2c3d4e-5f60-4718-92a3-b4c5d6e7f809")?;

    let courses = vec![
        ("COSC 201", "Data Structures", 3, 0.75, 0.10),
        ("MATH 211", "Linear Algebra", 4, 0.80, 0.05),
    ];

    let now = Utc::now();

    for (code, title, credits, requirement, buffer) in courses {
        let course_id: Uuid = sqlx::query(
            "INSERT INTO attendance_planner.courses (id, code, title, credits) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (code) DO UPDATE SET title = EXCLUDED.title \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(title)
        .bind(credits)
        .fetch_one(pool)
        .await?
        .get("id");

        let offering_id: Uuid = sqlx::query(
            "INSERT INTO attendance_planner.course_offerings \
             (id, course_id, semester, required_attendance, attendance_buffer) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (course_id, semester) DO UPDATE \
             SET required_attendance = EXCLUDED.required_attendance, \
             attendance_buffer = EXCLUDED.attendance_buffer \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind("2026-1")
        .bind(requirement)
        .bind(buffer)
        .fetch_one(pool)
        .await?
        .get("id");

        sqlx::query(
            "INSERT INTO attendance_planner.enrollments (id, student_id, offering_id) \
             VALUES ($1, $2, $3) ON CONFLICT (student_id, offering_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(offering_id)
        .execute(pool)
        .await?;

        let existing_sessions: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM attendance_planner.attendance_sessions \
             WHERE offering_id = $1",
        )
        .bind(offering_id)
        .fetch_one(pool)
        .await?
        .get("n");
        if existing_sessions > 0 {
            continue;
        }

        // 20 sessions every 2 days, starting 10 days back so some are past
        // and some upcoming.
        let mut first_session: Option<Uuid> = None;
        for i in 0..20i64 {
            let session_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO attendance_planner.attendance_sessions (id, offering_id, held_at) \
                 VALUES ($1, $2, $3)",
            )
            .bind(session_id)
            .bind(offering_id)
            .bind(now + Duration::days(2 * i - 10))
            .execute(pool)
            .await?;
            if first_session.is_none() {
                first_session = Some(session_id);
            }
        }

        if code == "COSC 201" {
            if let Some(session_id) = first_session {
                sqlx::query(
                    "INSERT INTO attendance_planner.declared_misses \
                     (id, session_id, student_id, reason) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (session_id, student_id) DO NOTHING",
                )
                .bind(Uuid::new_v4())
                .bind(session_id)
                .bind(student_id)
                .bind("Sick")
                .execute(pool)
                .await?;
            }
        }
    }

    let existing_tasks: i64 =
        sqlx::query("SELECT COUNT(*) AS n FROM attendance_planner.tasks WHERE student_id = $1")
            .bind(student_id)
            .fetch_one(pool)
            .await?
            .get("n");
    if existing_tasks == 0 {
        let tasks = vec![
            ("Finish problem set 3", Duration::days(2), 8, 90),
            ("Read chapter 5", Duration::days(6), 4, 60),
            ("Revise lecture notes", Duration::days(-1), 6, 45),
        ];

        for (title, offset, importance, minutes) in tasks {
            add_task(pool, student_id, title, now + offset, importance, minutes).await?;
        }
    }

    Ok(())
}
