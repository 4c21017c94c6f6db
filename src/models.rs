use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Mentor,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "mentor" => Some(Role::Mentor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFact {
    pub user_id: i64,
    pub role: Role,
    pub is_active: bool,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
}

/// One enrollment joined with the course it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentFact {
    pub student_id: i64,
    pub course_id: i64,
    pub course_title: String,
    pub category: String,
    pub difficulty_level: String,
    pub enrolled_at: DateTime<Utc>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_percentage: f64,
}

/// One enrollment x assignment x submission row. Assignment and submission
/// columns are empty when the join found nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionFact {
    pub student_id: i64,
    pub student_name: String,
    pub course_id: i64,
    pub course_title: String,
    pub category: String,
    pub difficulty_level: String,
    pub enrolled_at: DateTime<Utc>,
    pub is_completed: bool,
    pub assignment_id: Option<i64>,
    pub max_points: Option<f64>,
    pub grade: Option<f64>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub is_late: bool,
}

impl SubmissionFact {
    /// Grade as a percentage of the assignment's max points. Rows without
    /// usable max points are taken to be graded out of 100 already.
    pub fn score(&self) -> Option<f64> {
        let grade = self.grade?;
        match self.max_points {
            Some(max) if max > 0.0 => Some(grade / max * 100.0),
            _ => Some(grade),
        }
    }
}

/// One course joined with its mentor and its per-course rollups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseFact {
    pub course_id: i64,
    pub title: String,
    pub category: String,
    pub difficulty_level: String,
    pub is_active: bool,
    pub mentor_id: i64,
    pub mentor_name: String,
    pub mentor_expertise: Option<String>,
    pub enrolled_students: u32,
    pub completed_students: u32,
    pub avg_rating: Option<f64>,
    pub review_count: u32,
    pub assignments_created: u32,
    pub graded_submissions: u32,
    pub avg_assignment_score: Option<f64>,
    pub modules_created: u32,
}

impl CourseFact {
    pub fn completion_rate(&self) -> f64 {
        crate::stats::rate(self.completed_students as usize, self.enrolled_students as usize)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentorFact {
    pub mentor_id: i64,
    pub name: String,
    pub expertise: Option<String>,
    pub is_approved: bool,
    pub is_active: bool,
}

/// Point-in-time input for one computation pass.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub users: Vec<UserFact>,
    pub mentors: Vec<MentorFact>,
    pub courses: Vec<CourseFact>,
    pub enrollments: Vec<EnrollmentFact>,
    pub submissions: Vec<SubmissionFact>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.mentors.is_empty()
            && self.courses.is_empty()
            && self.enrollments.is_empty()
            && self.submissions.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.users.len()
            + self.mentors.len()
            + self.courses.len()
            + self.enrollments.len()
            + self.submissions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(max_points: Option<f64>, grade: Option<f64>) -> SubmissionFact {
        SubmissionFact {
            student_id: 1,
            student_name: "Amara Cole".to_string(),
            course_id: 10,
            course_title: "Rust Fundamentals".to_string(),
            category: "Programming".to_string(),
            difficulty_level: "beginner".to_string(),
            enrolled_at: Utc.with_ymd_and_hms(2024, 1, 6, 10, 0, 0).unwrap(),
            is_completed: false,
            assignment_id: Some(100),
            max_points,
            grade,
            submitted_at: None,
            is_late: false,
        }
    }

    #[test]
    fn score_scales_by_max_points_or_keeps_raw_grade() {
        assert_eq!(row(Some(50.0), Some(25.0)).score(), Some(50.0));
        assert_eq!(row(Some(0.0), Some(72.0)).score(), Some(72.0));
        assert_eq!(row(None, Some(72.0)).score(), Some(72.0));
        assert_eq!(row(Some(100.0), None).score(), None);
    }
}
