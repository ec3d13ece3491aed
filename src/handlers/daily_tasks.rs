use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use sqlx::types::Json as Jsonb;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{CreateDailyTaskRequest, DailyTaskQuery, DeleteResponse, UpdateDailyTaskRequest};
use crate::error::{on_unique_violation, AppError, AppResult};
use crate::models::daily_task::{
    decorated_name, derive_status, has_duplicate_sub_task, DailyTask, SubTask,
    DEFAULT_DESCRIPTION,
};
use crate::AppState;

/// Fetch a daily task scoped to its owner. Another user's task is reported
/// as not found, never as forbidden, so existence does not leak.
pub(crate) async fn fetch_owned_task(
    db: &sqlx::PgPool,
    user_id: Uuid,
    task_id: Uuid,
) -> AppResult<DailyTask> {
    sqlx::query_as::<_, DailyTask>("SELECT * FROM daily_tasks WHERE id = $1 AND user_id = $2")
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("Daily task not found".into()))
}

pub(crate) fn check_window(
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
) -> AppResult<()> {
    if end < start {
        return Err(AppError::Validation(
            "Sub-task end_date must not precede start_date".into(),
        ));
    }
    Ok(())
}

pub async fn list_daily_tasks(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<DailyTaskQuery>,
) -> AppResult<Json<Vec<DailyTask>>> {
    let tasks = sqlx::query_as::<_, DailyTask>(
        r#"
        SELECT * FROM daily_tasks
        WHERE user_id = $1
          AND ($2::date IS NULL OR date = $2)
          AND ($3::task_status IS NULL OR status = $3)
        ORDER BY date DESC, created_at ASC
        "#,
    )
    .bind(auth_user.id)
    .bind(query.date)
    .bind(query.status)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(tasks))
}

pub async fn get_daily_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<DailyTask>> {
    let task = fetch_owned_task(&state.db, auth_user.id, task_id).await?;
    Ok(Json(task))
}

pub async fn create_daily_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateDailyTaskRequest>,
) -> AppResult<Json<DailyTask>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let name = decorated_name(&body.title, body.date);

    // Pre-check for a clean 409; the unique index on (user_id, name, date)
    // is the backstop when two creates race past this.
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM daily_tasks WHERE user_id = $1 AND name = $2 AND date = $3",
    )
    .bind(auth_user.id)
    .bind(&name)
    .bind(body.date)
    .fetch_one(&state.db)
    .await?;

    if exists > 0 {
        return Err(AppError::Conflict(format!(
            "A daily task named \"{}\" already exists for that date",
            name
        )));
    }

    let mut sub_tasks: Vec<SubTask> = Vec::with_capacity(body.sub_tasks.len());
    for input in body.sub_tasks {
        check_window(input.start_date, input.end_date)?;
        if has_duplicate_sub_task(&sub_tasks, &input.task_name, input.start_date) {
            return Err(AppError::Conflict(format!(
                "Duplicate sub-task \"{}\" with the same start date",
                input.task_name
            )));
        }
        sub_tasks.push(SubTask {
            id: Uuid::new_v4(),
            task_name: input.task_name,
            status: input.status.unwrap_or_default(),
            start_date: input.start_date,
            end_date: input.end_date,
            description: input.description.unwrap_or_else(|| DEFAULT_DESCRIPTION.into()),
        });
    }

    // Explicit status wins; otherwise it is derived from the sub-tasks.
    let status = body.status.unwrap_or_else(|| derive_status(&sub_tasks));

    let task = sqlx::query_as::<_, DailyTask>(
        r#"
        INSERT INTO daily_tasks (id, user_id, name, date, status, description, sub_tasks)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(&name)
    .bind(body.date)
    .bind(status)
    .bind(
        body.description
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.into()),
    )
    .bind(Jsonb(sub_tasks))
    .fetch_one(&state.db)
    .await
    .map_err(|e| on_unique_violation(e, "A daily task with that name and date already exists"))?;

    Ok(Json(task))
}

pub async fn update_daily_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
    Json(body): Json<UpdateDailyTaskRequest>,
) -> AppResult<Json<DailyTask>> {
    let task = sqlx::query_as::<_, DailyTask>(
        r#"
        UPDATE daily_tasks SET
            status = COALESCE($3, status),
            description = COALESCE($4, description),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(task_id)
    .bind(auth_user.id)
    .bind(body.status)
    .bind(&body.description)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Daily task not found".into()))?;

    Ok(Json(task))
}

/// Deleting a daily task removes its embedded sub-tasks in the same row
/// delete; orphaned sub-tasks cannot exist.
pub async fn delete_daily_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<DeleteResponse>> {
    let result = sqlx::query("DELETE FROM daily_tasks WHERE id = $1 AND user_id = $2")
        .bind(task_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Daily task not found".into()));
    }

    Ok(Json(DeleteResponse {
        deleted: true,
        id: task_id,
    }))
}
