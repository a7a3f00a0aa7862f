use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod config;
mod db;
mod models;
mod report;
mod risk;
mod urgency;

use config::ScoringConfig;

#[derive(Parser)]
#[command(name = "attendance-planner")]
#[command(about = "Attendance risk and task urgency planner for students", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Show ranked course risk and the urgent task queue for a student
    Dashboard {
        #[arg(long)]
        email: String,
        /// Emit JSON instead of the terminal listing
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Declare a missed session, or retract the declaration if it exists
    DeclareMiss {
        #[arg(long)]
        email: String,
        #[arg(long)]
        session: Uuid,
        #[arg(long, default_value = "Declared by student")]
        reason: String,
    },
    /// Add a task to the student's list
    AddTask {
        #[arg(long)]
        email: String,
        #[arg(long)]
        title: String,
        /// RFC 3339 or "YYYY-MM-DD HH:MM" (UTC)
        #[arg(long)]
        deadline: String,
        #[arg(long, default_value_t = 5)]
        importance: i32,
        #[arg(long, default_value_t = 60)]
        duration_minutes: i32,
    },
    /// Mark a task as completed
    CompleteTask {
        #[arg(long)]
        email: String,
        #[arg(long)]
        task: Uuid,
    },
    /// Import tasks from a CSV file
    ImportTasks {
        #[arg(long)]
        email: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Create a course and offer it for a semester (admin only)
    AddCourse {
        #[arg(long)]
        admin_email: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value_t = 3)]
        credits: i32,
        #[arg(long)]
        semester: String,
        /// Fraction in [0, 1]; defaults to the schema's 0.75 when omitted
        #[arg(long)]
        required_attendance: Option<f64>,
        /// Fraction in [0, 1]; defaults to the schema's 0.10 when omitted
        #[arg(long)]
        attendance_buffer: Option<f64>,
    },
    /// Schedule an attendance session for an offering (admin only)
    AddSession {
        #[arg(long)]
        admin_email: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        semester: String,
        /// RFC 3339 or "YYYY-MM-DD HH:MM" (UTC)
        #[arg(long)]
        at: String,
    },
    /// Update the scoring configuration (admin only)
    SetConfig {
        #[arg(long)]
        admin_email: String,
        #[arg(long)]
        weight_deadline: f64,
        #[arg(long)]
        weight_importance: f64,
        #[arg(long)]
        weight_next_class: f64,
        #[arg(long)]
        weight_effort_fit: f64,
        #[arg(long, default_value_t = 14)]
        deadline_window_days: i32,
        #[arg(long, default_value_t = 6)]
        next_class_window_hours: i32,
    },
    /// Show the resolved scoring configuration (admin only)
    ShowConfig {
        #[arg(long)]
        admin_email: String,
    },
    /// Show administrative counts (admin only)
    Stats {
        #[arg(long)]
        admin_email: String,
    },
}

fn parse_deadline(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .with_context(|| format!("could not parse deadline '{raw}'"))?;
    Ok(naive.and_utc())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Dashboard { email, json } => {
            let student = db::require_student(&pool, &email).await?;
            let config = ScoringConfig::resolve(db::fetch_config(&pool).await?);
            let offerings = db::fetch_offerings(&pool, student.id).await?;
            let tasks = db::fetch_open_tasks(&pool, student.id).await?;

            let now = Utc::now();
            let next_class = urgency::next_class_after(&offerings, now);
            let ranked_courses = risk::rank_courses(&offerings);
            let ranked_tasks = urgency::rank_tasks(&tasks, next_class, &config, now);

            if json {
                let payload = serde_json::json!({
                    "courses": ranked_courses,
                    "tasks": ranked_tasks,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }

            println!("Course risk for {} <{}>:", student.full_name, student.email);
            if ranked_courses.is_empty() {
                println!("  (no enrollments)");
            }
            for course in &ranked_courses {
                println!(
                    "  [{}] {} {}: attendance {:.0}%, {} allowable misses left",
                    course.risk_category.as_str(),
                    course.course_code,
                    course.course_title,
                    course.current_attendance * 100.0,
                    course.remaining_allowable_misses
                );
            }

            println!();
            println!("Task queue:");
            if ranked_tasks.is_empty() {
                println!("  (no open tasks)");
            }
            for task in &ranked_tasks {
                println!(
                    "  {:.3} {} (due {})",
                    task.urgency_score,
                    task.title,
                    task.deadline.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Commands::Report { email, out } => {
            let student = db::require_student(&pool, &email).await?;
            let config = ScoringConfig::resolve(db::fetch_config(&pool).await?);
            let offerings = db::fetch_offerings(&pool, student.id).await?;
            let tasks = db::fetch_open_tasks(&pool, student.id).await?;

            let now = Utc::now();
            let next_class = urgency::next_class_after(&offerings, now);
            let ranked_courses = risk::rank_courses(&offerings);
            let ranked_tasks = urgency::rank_tasks(&tasks, next_class, &config, now);

            let report = report::build_report(
                &student.full_name,
                now,
                next_class,
                &ranked_courses,
                &ranked_tasks,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::DeclareMiss {
            email,
            session,
            reason,
        } => {
            let student = db::require_student(&pool, &email).await?;
            let declared = db::toggle_declared_miss(&pool, session, student.id, &reason).await?;
            if declared {
                println!("Miss declared for session {session}.");
            } else {
                println!("Declaration retracted for session {session}.");
            }
        }
        Commands::AddTask {
            email,
            title,
            deadline,
            importance,
            duration_minutes,
        } => {
            let student = db::require_student(&pool, &email).await?;
            let deadline = parse_deadline(&deadline)?;
            let id =
                db::add_task(&pool, student.id, &title, deadline, importance, duration_minutes)
                    .await?;
            println!("Task {id} added.");
        }
        Commands::CompleteTask { email, task } => {
            let student = db::require_student(&pool, &email).await?;
            db::complete_task(&pool, student.id, task).await?;
            println!("Task {task} completed.");
        }
        Commands::ImportTasks { email, csv } => {
            let student = db::require_student(&pool, &email).await?;
            let inserted = db::import_tasks_csv(&pool, student.id, &csv).await?;
            println!("Inserted {inserted} tasks from {}.", csv.display());
        }
        Commands::AddCourse {
            admin_email,
            code,
            title,
            credits,
            semester,
            required_attendance,
            attendance_buffer,
        } => {
            db::require_admin(&pool, &admin_email).await?;
            let (course_id, offering_id) = db::add_course(
                &pool,
                &code,
                &title,
                credits,
                &semester,
                required_attendance,
                attendance_buffer,
            )
            .await?;
            println!("Course {code} created ({course_id}), offering {offering_id} for {semester}.");
        }
        Commands::AddSession {
            admin_email,
            course,
            semester,
            at,
        } => {
            db::require_admin(&pool, &admin_email).await?;
            let held_at = parse_deadline(&at)?;
            let session_id = db::add_session(&pool, &course, &semester, held_at).await?;
            println!("Session {session_id} scheduled for {course} at {held_at}.");
        }
        Commands::SetConfig {
            admin_email,
            weight_deadline,
            weight_importance,
            weight_next_class,
            weight_effort_fit,
            deadline_window_days,
            next_class_window_hours,
        } => {
            db::require_admin(&pool, &admin_email).await?;
            let config = ScoringConfig {
                weight_deadline,
                weight_importance,
                weight_next_class,
                weight_effort_fit,
                deadline_window_days,
                next_class_window_hours,
            };
            db::save_config(&pool, &config).await?;
            println!("Scoring configuration updated.");
        }
        Commands::ShowConfig { admin_email } => {
            db::require_admin(&pool, &admin_email).await?;
            let config = ScoringConfig::resolve(db::fetch_config(&pool).await?);
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Stats { admin_email } => {
            db::require_admin(&pool, &admin_email).await?;
            let stats = db::admin_stats(&pool).await?;
            println!("Students: {}", stats.students);
            println!("Courses: {}", stats.courses);
            println!("Sessions: {}", stats.sessions);
            println!("Open tasks: {}", stats.open_tasks);
        }
    }

    Ok(())
}
