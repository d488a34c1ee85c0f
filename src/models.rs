//! Typed records stored by the learning dashboard.
//!
//! Documents carry no schema in the store; these are the shapes the app
//! reads back. Decoding goes through [`WithId::decode`](crate::types::WithId::decode),
//! so a document that does not fit its record type surfaces as a decode
//! error on the subscription instead of passing through.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `users/{uid}/profile/{uid}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub qualification_id: Option<String>,
}

/// `users/{uid}/quizAttempts/{attemptId}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub topic: String,
    pub score: u32,
    /// Score as a percentage, 0-100.
    pub percentage: f64,
    /// Microseconds since Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub questions: Vec<Value>,
}

impl QuizAttempt {
    pub fn is_perfect(&self) -> bool {
        self.percentage >= 100.0
    }
}

/// Row of a `leaderboard` collection group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub name: String,
    #[serde(default)]
    pub total_score: i64,
    #[serde(default)]
    pub qualification_id: Option<String>,
}

/// `qualifications/{level}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualification {
    pub id: String,
    pub level: String,
}

/// `users/{uid}/progress/{uid}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProgress {
    pub total_score: f64,
    pub average_score: f64,
    pub quizzes_taken: u32,
    pub daily_streak: u32,
}

impl UserProgress {
    /// Fold a finished attempt into the running totals.
    pub fn record_attempt(&mut self, attempt: &QuizAttempt) {
        let total = self.average_score * f64::from(self.quizzes_taken) + attempt.percentage;
        self.quizzes_taken += 1;
        self.average_score = total / f64::from(self.quizzes_taken);
        self.total_score += f64::from(attempt.score);
    }
}
