//! # DayPlan — Request/Response DTOs
//!
//! All API contract types in one module.
//!
//! Conventions:
//! - `*Request`  → deserialized from client JSON body or query params
//! - `*Response` → serialized to client JSON
//! - Structural validation is expressed via `validator` derive macros;
//!   cross-field rules (e.g. sub-task time windows) are checked in handlers

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::daily_task::TaskStatus;

// ============================================================================
// Common
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

// ============================================================================
// Auth
// ============================================================================

/// POST /api/auth/register
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 254, message = "Email too long"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
}

/// POST /api/auth/login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// POST /api/auth/refresh
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// ============================================================================
// Daily tasks
// ============================================================================

/// POST /api/daily-tasks
///
/// The stored name is decorated server-side as `"<title> - <dd-MM-yy>"`;
/// clients send the raw title.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDailyTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    pub date: NaiveDate,

    pub status: Option<TaskStatus>,

    pub description: Option<String>,

    #[validate]
    #[serde(default)]
    pub sub_tasks: Vec<SubTaskInput>,
}

/// PUT /api/daily-tasks/:id
#[derive(Debug, Deserialize)]
pub struct UpdateDailyTaskRequest {
    pub status: Option<TaskStatus>,
    pub description: Option<String>,
}

/// GET /api/daily-tasks query params
#[derive(Debug, Deserialize)]
pub struct DailyTaskQuery {
    pub date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
}

// ============================================================================
// Sub-tasks
// ============================================================================

/// Body of POST /api/daily-tasks/:id/sub-tasks, and the element type for
/// sub-tasks supplied at daily-task creation.
#[derive(Debug, Deserialize, Validate)]
pub struct SubTaskInput {
    #[validate(length(min = 1, max = 200, message = "Sub-task name must be 1-200 characters"))]
    pub task_name: String,

    pub status: Option<TaskStatus>,

    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,

    pub description: Option<String>,
}

/// PUT /api/daily-tasks/:id/sub-tasks/:sub_task_id
#[derive(Debug, Deserialize)]
pub struct UpdateSubTaskRequest {
    pub task_name: Option<String>,
    pub status: Option<TaskStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

/// GET /api/sub-tasks/:status query params
#[derive(Debug, Deserialize)]
pub struct SubTaskSearchQuery {
    pub search: Option<String>,
}
