use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use crate::error::{redact_url, SnapshotError};
use crate::models::{CourseFact, EnrollmentFact, MentorFact, Role, Snapshot, SubmissionFact, UserFact};

/// Submission grade as a percentage of max points. Without usable max points
/// the grade is taken as a percentage already, matching `SubmissionFact::score`.
const SUBMISSION_SCORE: &str = "COALESCE(s.grade / NULLIF(a.max_points, 0) * 100, s.grade)";

pub async fn connect(database_url: &str) -> Result<PgPool, SnapshotError> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|source| SnapshotError::Connect {
            target: redact_url(database_url),
            source,
        })
}

pub async fn fetch_snapshot(pool: &PgPool) -> Result<Snapshot, SnapshotError> {
    let snapshot = Snapshot {
        users: fetch_users(pool).await?,
        mentors: fetch_mentors(pool).await?,
        courses: fetch_courses(pool).await?,
        enrollments: fetch_enrollments(pool).await?,
        submissions: fetch_submissions(pool).await?,
    };
    debug!(rows = snapshot.row_count(), "postgres snapshot loaded");
    Ok(snapshot)
}

fn query_error(collection: &'static str) -> impl Fn(sqlx::Error) -> SnapshotError {
    move |source| SnapshotError::Query { collection, source }
}

fn count_column(row: &PgRow, column: &str) -> Result<u32, sqlx::Error> {
    let value: i64 = row.try_get(column)?;
    Ok(u32::try_from(value.max(0)).unwrap_or(u32::MAX))
}

pub async fn fetch_users(pool: &PgPool) -> Result<Vec<UserFact>, SnapshotError> {
    let rows = sqlx::query(
        r#"
        SELECT id::int8 AS user_id, role,
               COALESCE(is_active, true) AS is_active,
               COALESCE(is_approved, false) AS is_approved,
               created_at AT TIME ZONE 'UTC' AS created_at
        FROM users
        WHERE created_at IS NOT NULL
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(query_error("users"))?;

    let mut users = Vec::with_capacity(rows.len());
    for row in rows {
        let raw_role: String = row.try_get("role").map_err(query_error("users"))?;
        let Some(role) = Role::parse(&raw_role) else {
            warn!(role = %raw_role, "skipping user with unknown role");
            continue;
        };
        users.push(UserFact {
            user_id: row.try_get("user_id").map_err(query_error("users"))?,
            role,
            is_active: row.try_get("is_active").map_err(query_error("users"))?,
            is_approved: row.try_get("is_approved").map_err(query_error("users"))?,
            created_at: row.try_get("created_at").map_err(query_error("users"))?,
        });
    }

    Ok(users)
}

pub async fn fetch_mentors(pool: &PgPool) -> Result<Vec<MentorFact>, SnapshotError> {
    let rows = sqlx::query(
        r#"
        SELECT id::int8 AS mentor_id, first_name || ' ' || last_name AS name, expertise,
               COALESCE(is_approved, false) AS is_approved, COALESCE(is_active, true) AS is_active
        FROM users
        WHERE role = 'mentor'
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(query_error("mentors"))?;

    rows.iter()
        .map(|row| {
            Ok(MentorFact {
                mentor_id: row.try_get("mentor_id")?,
                name: row.try_get("name")?,
                expertise: row.try_get("expertise")?,
                is_approved: row.try_get("is_approved")?,
                is_active: row.try_get("is_active")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(query_error("mentors"))
}

/// Per-course rollups are computed in correlated subqueries so that joining
/// reviews, assignments and modules does not multiply the counts.
pub async fn fetch_courses(pool: &PgPool) -> Result<Vec<CourseFact>, SnapshotError> {
    let sql = format!(
        r#"
        SELECT
            c.id::int8 AS course_id,
            c.title,
            c.category,
            COALESCE(c.difficulty_level, 'beginner') AS difficulty_level,
            COALESCE(c.is_active, true) AS is_active,
            m.id::int8 AS mentor_id,
            m.first_name || ' ' || m.last_name AS mentor_name,
            m.expertise AS mentor_expertise,
            (SELECT COUNT(DISTINCT e.student_id) FROM enrollments e
                WHERE e.course_id = c.id) AS enrolled_students,
            (SELECT COUNT(*) FROM enrollments e
                WHERE e.course_id = c.id AND e.is_completed) AS completed_students,
            (SELECT AVG(r.rating)::float8 FROM course_reviews r
                WHERE r.course_id = c.id) AS avg_rating,
            (SELECT COUNT(*) FROM course_reviews r
                WHERE r.course_id = c.id) AS review_count,
            (SELECT COUNT(*) FROM assignments a
                WHERE a.course_id = c.id) AS assignments_created,
            (SELECT COUNT(*) FROM submissions s JOIN assignments a ON a.id = s.assignment_id
                WHERE a.course_id = c.id AND s.grade IS NOT NULL) AS graded_submissions,
            (SELECT AVG({SUBMISSION_SCORE})::float8
                FROM submissions s JOIN assignments a ON a.id = s.assignment_id
                WHERE a.course_id = c.id AND s.grade IS NOT NULL) AS avg_assignment_score,
            (SELECT COUNT(*) FROM modules mo
                WHERE mo.course_id = c.id) AS modules_created
        FROM courses c
        JOIN users m ON m.id = c.mentor_id
        ORDER BY m.id, c.created_at DESC
        "#,
    );
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(query_error("courses"))?;

    rows.iter()
        .map(|row| {
            Ok(CourseFact {
                course_id: row.try_get("course_id")?,
                title: row.try_get("title")?,
                category: row.try_get("category")?,
                difficulty_level: row.try_get("difficulty_level")?,
                is_active: row.try_get("is_active")?,
                mentor_id: row.try_get("mentor_id")?,
                mentor_name: row.try_get("mentor_name")?,
                mentor_expertise: row.try_get("mentor_expertise")?,
                enrolled_students: count_column(row, "enrolled_students")?,
                completed_students: count_column(row, "completed_students")?,
                avg_rating: row.try_get("avg_rating")?,
                review_count: count_column(row, "review_count")?,
                assignments_created: count_column(row, "assignments_created")?,
                graded_submissions: count_column(row, "graded_submissions")?,
                avg_assignment_score: row.try_get("avg_assignment_score")?,
                modules_created: count_column(row, "modules_created")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(query_error("courses"))
}

pub async fn fetch_enrollments(pool: &PgPool) -> Result<Vec<EnrollmentFact>, SnapshotError> {
    let rows = sqlx::query(
        r#"
        SELECT
            e.student_id::int8 AS student_id,
            c.id::int8 AS course_id,
            c.title AS course_title,
            c.category,
            COALESCE(c.difficulty_level, 'beginner') AS difficulty_level,
            e.enrollment_date AT TIME ZONE 'UTC' AS enrolled_at,
            COALESCE(e.is_completed, false) AS is_completed,
            e.completion_date AT TIME ZONE 'UTC' AS completed_at,
            COALESCE(e.completion_percentage, 0)::float8 AS completion_percentage
        FROM enrollments e
        JOIN courses c ON c.id = e.course_id
        WHERE c.is_active = true AND e.enrollment_date IS NOT NULL
        ORDER BY c.created_at DESC, e.enrollment_date DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(query_error("enrollments"))?;

    rows.iter()
        .map(|row| {
            Ok(EnrollmentFact {
                student_id: row.try_get("student_id")?,
                course_id: row.try_get("course_id")?,
                course_title: row.try_get("course_title")?,
                category: row.try_get("category")?,
                difficulty_level: row.try_get("difficulty_level")?,
                enrolled_at: row.try_get("enrolled_at")?,
                is_completed: row.try_get("is_completed")?,
                completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
                completion_percentage: row.try_get("completion_percentage")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(query_error("enrollments"))
}

pub async fn fetch_submissions(pool: &PgPool) -> Result<Vec<SubmissionFact>, SnapshotError> {
    let rows = sqlx::query(
        r#"
        SELECT
            s.id::int8 AS student_id,
            s.first_name || ' ' || s.last_name AS student_name,
            c.id::int8 AS course_id,
            c.title AS course_title,
            c.category,
            COALESCE(c.difficulty_level, 'beginner') AS difficulty_level,
            e.enrollment_date AT TIME ZONE 'UTC' AS enrolled_at,
            COALESCE(e.is_completed, false) AS is_completed,
            a.id::int8 AS assignment_id,
            a.max_points::float8 AS max_points,
            sub.grade::float8 AS grade,
            sub.submitted_at AT TIME ZONE 'UTC' AS submitted_at,
            COALESCE(sub.is_late, false) AS is_late
        FROM users s
        JOIN enrollments e ON s.id = e.student_id
        JOIN courses c ON e.course_id = c.id
        LEFT JOIN assignments a ON c.id = a.course_id
        LEFT JOIN submissions sub ON a.id = sub.assignment_id AND s.id = sub.student_id
        WHERE s.role = 'student' AND s.is_active = true AND c.is_active = true
          AND e.enrollment_date IS NOT NULL
        ORDER BY s.id, c.id, a.id
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(query_error("submissions"))?;

    rows.iter()
        .map(|row| {
            Ok(SubmissionFact {
                student_id: row.try_get("student_id")?,
                student_name: row.try_get("student_name")?,
                course_id: row.try_get("course_id")?,
                course_title: row.try_get("course_title")?,
                category: row.try_get("category")?,
                difficulty_level: row.try_get("difficulty_level")?,
                enrolled_at: row.try_get("enrolled_at")?,
                is_completed: row.try_get("is_completed")?,
                assignment_id: row.try_get("assignment_id")?,
                max_points: row.try_get("max_points")?,
                grade: row.try_get("grade")?,
                submitted_at: row.try_get::<Option<DateTime<Utc>>, _>("submitted_at")?,
                is_late: row.try_get("is_late")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(query_error("submissions"))
}
