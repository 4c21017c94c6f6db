use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::context::MetricsContext;
use crate::models::Role;
use crate::stats::{self, round2};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserCounts {
    pub total: usize,
    pub active: usize,
    pub students: usize,
    pub mentors: usize,
    pub pending_mentors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CourseCounts {
    pub total: usize,
    pub active: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrollmentCounts {
    pub total: usize,
    pub completed: usize,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecentActivity {
    pub days: i64,
    pub registrations: usize,
    pub enrollments: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthIndicators {
    pub retention_rate: f64,
    pub course_utilization: f64,
    pub mentor_approval_rate: f64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlatformOverview {
    pub users: UserCounts,
    pub courses: CourseCounts,
    pub enrollments: EnrollmentCounts,
    pub recent_activity: RecentActivity,
    pub health: HealthIndicators,
}

pub fn analyze(ctx: &MetricsContext<'_>) -> PlatformOverview {
    let snapshot = ctx.snapshot;
    let users = &snapshot.users;

    let user_counts = UserCounts {
        total: users.len(),
        active: users.iter().filter(|u| u.is_active).count(),
        students: users
            .iter()
            .filter(|u| u.role == Role::Student && u.is_active)
            .count(),
        mentors: users
            .iter()
            .filter(|u| u.role == Role::Mentor && u.is_active && u.is_approved)
            .count(),
        pending_mentors: users
            .iter()
            .filter(|u| u.role == Role::Mentor && !u.is_approved)
            .count(),
    };

    let course_counts = CourseCounts {
        total: snapshot.courses.len(),
        active: snapshot.courses.iter().filter(|c| c.is_active).count(),
    };

    let completed = snapshot.enrollments.iter().filter(|e| e.is_completed).count();
    let enrollment_counts = EnrollmentCounts {
        total: snapshot.enrollments.len(),
        completed,
        completion_rate: round2(stats::rate(completed, snapshot.enrollments.len())),
    };

    let days = ctx.config.trends.recent_activity_days;
    let since = Duration::try_days(days)
        .and_then(|span| ctx.now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let recent_activity = RecentActivity {
        days,
        registrations: users.iter().filter(|u| u.created_at >= since).count(),
        enrollments: snapshot
            .enrollments
            .iter()
            .filter(|e| e.enrolled_at >= since)
            .count(),
    };

    let health = HealthIndicators {
        retention_rate: round2(stats::rate(user_counts.active, user_counts.total)),
        course_utilization: if course_counts.active == 0 {
            0.0
        } else {
            round2(enrollment_counts.total as f64 / course_counts.active as f64)
        },
        mentor_approval_rate: round2(stats::rate(
            user_counts.mentors,
            user_counts.mentors + user_counts.pending_mentors,
        )),
        completion_rate: enrollment_counts.completion_rate,
    };

    PlatformOverview {
        users: user_counts,
        courses: course_counts,
        enrollments: enrollment_counts,
        recent_activity,
        health,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::{Snapshot, UserFact};
    use chrono::TimeZone;

    fn user(user_id: i64, role: Role, is_active: bool, is_approved: bool, days_ago: i64) -> UserFact {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        UserFact {
            user_id,
            role,
            is_active,
            is_approved,
            created_at: now - Duration::days(days_ago),
        }
    }

    #[test]
    fn counts_roles_and_recent_activity() {
        let snapshot = Snapshot {
            users: vec![
                user(1, Role::Student, true, false, 3),
                user(2, Role::Student, false, false, 100),
                user(3, Role::Mentor, true, true, 45),
                user(4, Role::Mentor, true, false, 10),
                user(5, Role::Admin, true, true, 400),
            ],
            ..Default::default()
        };
        let config = EngineConfig::default();
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let overview = analyze(&MetricsContext::new(&snapshot, &config, now));

        assert_eq!(overview.users.total, 5);
        assert_eq!(overview.users.active, 4);
        assert_eq!(overview.users.students, 1);
        assert_eq!(overview.users.mentors, 1);
        assert_eq!(overview.users.pending_mentors, 1);
        assert_eq!(overview.recent_activity.registrations, 2);
        assert_eq!(overview.health.retention_rate, 80.0);
        assert_eq!(overview.health.mentor_approval_rate, 50.0);
    }

    #[test]
    fn oversized_activity_window_counts_everything() {
        let snapshot = Snapshot {
            users: vec![user(1, Role::Student, true, false, 5000)],
            ..Default::default()
        };
        let mut config = EngineConfig::default();
        config.trends.recent_activity_days = 9_000_000_000_000;
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let overview = analyze(&MetricsContext::new(&snapshot, &config, now));
        assert_eq!(overview.recent_activity.registrations, 1);
    }

    #[test]
    fn empty_snapshot_is_all_zero() {
        let snapshot = Snapshot::default();
        let config = EngineConfig::default();
        let overview = analyze(&MetricsContext::new(&snapshot, &config, Utc::now()));
        assert_eq!(overview.health, HealthIndicators::default());
        assert_eq!(overview.enrollments.completion_rate, 0.0);
    }
}
