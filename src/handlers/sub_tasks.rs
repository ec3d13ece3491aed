use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use sqlx::types::Json as Jsonb;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{SubTaskInput, SubTaskSearchQuery, UpdateSubTaskRequest};
use crate::error::{AppError, AppResult};
use crate::handlers::daily_tasks::check_window;
use crate::models::daily_task::{
    derive_status, has_duplicate_sub_task, DailyTask, FlatSubTask, SubTask, TaskStatus,
    DEFAULT_DESCRIPTION,
};
use crate::AppState;

/// Fetch a parent task with its row locked for the rest of the transaction.
/// Sub-task mutations rewrite the whole embedded array, so the lock is what
/// keeps two concurrent mutations from overwriting each other's append.
async fn fetch_owned_task_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    task_id: Uuid,
) -> AppResult<DailyTask> {
    sqlx::query_as::<_, DailyTask>(
        "SELECT * FROM daily_tasks WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(task_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(AppError::NotFound("Daily task not found".into()))
}

/// Persist a parent's mutated sub-task array along with its recomputed
/// aggregate status. Must run in the same transaction as
/// `fetch_owned_task_for_update` so the row lock is still held.
async fn save_sub_tasks(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    task_id: Uuid,
    sub_tasks: Vec<SubTask>,
) -> AppResult<DailyTask> {
    let status = derive_status(&sub_tasks);

    sqlx::query_as::<_, DailyTask>(
        r#"
        UPDATE daily_tasks
        SET sub_tasks = $3, status = $4, updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(task_id)
    .bind(user_id)
    .bind(Jsonb(sub_tasks))
    .bind(status)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(AppError::NotFound("Daily task not found".into()))
}

pub async fn add_sub_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
    Json(body): Json<SubTaskInput>,
) -> AppResult<Json<DailyTask>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    check_window(body.start_date, body.end_date)?;

    let mut tx = state.db.begin().await?;
    let parent = fetch_owned_task_for_update(&mut tx, auth_user.id, task_id).await?;
    let mut sub_tasks = parent.sub_tasks.0;

    if has_duplicate_sub_task(&sub_tasks, &body.task_name, body.start_date) {
        return Err(AppError::Conflict(format!(
            "Sub-task \"{}\" with the same start date already exists",
            body.task_name
        )));
    }

    sub_tasks.push(SubTask {
        id: Uuid::new_v4(),
        task_name: body.task_name,
        status: body.status.unwrap_or_default(),
        start_date: body.start_date,
        end_date: body.end_date,
        description: body.description.unwrap_or_else(|| DEFAULT_DESCRIPTION.into()),
    });

    let updated = save_sub_tasks(&mut tx, auth_user.id, task_id, sub_tasks).await?;
    tx.commit().await?;
    Ok(Json(updated))
}

pub async fn update_sub_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((task_id, sub_task_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateSubTaskRequest>,
) -> AppResult<Json<DailyTask>> {
    let mut tx = state.db.begin().await?;
    let parent = fetch_owned_task_for_update(&mut tx, auth_user.id, task_id).await?;
    let mut sub_tasks = parent.sub_tasks.0;

    let idx = sub_tasks
        .iter()
        .position(|t| t.id == sub_task_id)
        .ok_or(AppError::NotFound("Sub-task not found".into()))?;

    let mut updated = sub_tasks[idx].clone();
    if let Some(task_name) = body.task_name {
        if task_name.is_empty() {
            return Err(AppError::Validation("Sub-task name must not be empty".into()));
        }
        updated.task_name = task_name;
    }
    if let Some(status) = body.status {
        updated.status = status;
    }
    if let Some(start_date) = body.start_date {
        updated.start_date = start_date;
    }
    if let Some(end_date) = body.end_date {
        updated.end_date = end_date;
    }
    if let Some(description) = body.description {
        updated.description = description;
    }
    check_window(updated.start_date, updated.end_date)?;

    // The duplicate rule holds against siblings, not against the sub-task's
    // own previous identity.
    let siblings: Vec<SubTask> = sub_tasks
        .iter()
        .filter(|t| t.id != sub_task_id)
        .cloned()
        .collect();
    if has_duplicate_sub_task(&siblings, &updated.task_name, updated.start_date) {
        return Err(AppError::Conflict(format!(
            "Sub-task \"{}\" with the same start date already exists",
            updated.task_name
        )));
    }

    sub_tasks[idx] = updated;

    let parent = save_sub_tasks(&mut tx, auth_user.id, task_id, sub_tasks).await?;
    tx.commit().await?;
    Ok(Json(parent))
}

/// Removes one sub-task from its parent; siblings and the parent's other
/// fields are untouched apart from the recomputed aggregate status.
pub async fn remove_sub_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((task_id, sub_task_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<DailyTask>> {
    let mut tx = state.db.begin().await?;
    let parent = fetch_owned_task_for_update(&mut tx, auth_user.id, task_id).await?;
    let mut sub_tasks = parent.sub_tasks.0;

    let before = sub_tasks.len();
    sub_tasks.retain(|t| t.id != sub_task_id);
    if sub_tasks.len() == before {
        return Err(AppError::NotFound("Sub-task not found".into()));
    }

    let parent = save_sub_tasks(&mut tx, auth_user.id, task_id, sub_tasks).await?;
    tx.commit().await?;
    Ok(Json(parent))
}

/// Escape LIKE/ILIKE pattern metacharacters so a search string matches
/// literally (`100%` must match "100%", not act as a wildcard).
fn escape_like_pattern(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Flattened cross-task listing: unwind every sub-task of the caller's
/// daily tasks, filter by status and optional case-insensitive name search,
/// and project each hit with its parent's name. Ordered by parent creation
/// time, then insertion order within the parent.
pub async fn list_sub_tasks_by_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(status): Path<TaskStatus>,
    Query(query): Query<SubTaskSearchQuery>,
) -> AppResult<Json<Vec<FlatSubTask>>> {
    let search = escape_like_pattern(&query.search.unwrap_or_default());

    let results = sqlx::query_as::<_, FlatSubTask>(
        r#"
        SELECT
            (st.elem->>'id')::uuid                AS id,
            st.elem->>'task_name'                 AS task_name,
            (st.elem->>'status')::task_status     AS status,
            (st.elem->>'start_date')::timestamptz AS start_date,
            (st.elem->>'end_date')::timestamptz   AS end_date,
            st.elem->>'description'               AS description,
            t.id                                  AS parent_id,
            t.name                                AS parent_name
        FROM daily_tasks t
        CROSS JOIN LATERAL jsonb_array_elements(t.sub_tasks) WITH ORDINALITY AS st(elem, ord)
        WHERE t.user_id = $1
          AND st.elem->>'status' = $2
          AND ($3 = '' OR st.elem->>'task_name' ILIKE '%' || $3 || '%')
        ORDER BY t.created_at ASC, st.ord ASC
        "#,
    )
    .bind(auth_user.id)
    .bind(status.as_str())
    .bind(&search)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rate_limit::RateLimitState;
    use crate::config::Config;
    use crate::AppState;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use std::sync::Arc;

    #[test]
    fn escape_like_pattern_escapes_wildcards() {
        assert_eq!(escape_like_pattern("milk"), "milk");
        assert_eq!(escape_like_pattern("100%"), "100\\%");
        assert_eq!(escape_like_pattern("a_b"), "a\\_b");
        assert_eq!(escape_like_pattern("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like_pattern(""), "");
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, hour, 0, 0).unwrap()
    }

    fn input(name: &str, hour: u32, status: TaskStatus) -> SubTaskInput {
        SubTaskInput {
            task_name: name.into(),
            status: Some(status),
            start_date: ts(hour),
            end_date: ts(hour + 1),
            description: None,
        }
    }

    /// Connects to TEST_DATABASE_URL when set; the database-backed tests
    /// below are no-ops without it.
    async fn test_state() -> Option<AppState> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .ok()?;
        sqlx::migrate!("./migrations").run(&db).await.ok()?;
        Some(AppState {
            db,
            config: Arc::new(Config {
                database_url: url,
                host: "127.0.0.1".into(),
                port: 0,
                frontend_url: "http://localhost:3000".into(),
                jwt_secret: "test-secret".into(),
                jwt_access_ttl_secs: 900,
                jwt_refresh_ttl_secs: 604800,
                db_max_connections: 5,
                db_acquire_timeout_secs: 5,
            }),
            rate_limiter: RateLimitState::new(),
        })
    }

    async fn seed_task(state: &AppState) -> (AuthUser, Uuid) {
        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, email, password_hash, name) VALUES ($1, $2, 'x', 'Test')")
            .bind(user_id)
            .bind(format!("{}@example.com", user_id))
            .execute(&state.db)
            .await
            .unwrap();

        let task_id = Uuid::new_v4();
        sqlx::query("INSERT INTO daily_tasks (id, user_id, name, date) VALUES ($1, $2, $3, $4)")
            .bind(task_id)
            .bind(user_id)
            .bind(format!("Chores {} - 15-03-24", task_id))
            .bind(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
            .execute(&state.db)
            .await
            .unwrap();

        (
            AuthUser {
                id: user_id,
                email: format!("{}@example.com", user_id),
            },
            task_id,
        )
    }

    #[tokio::test]
    async fn concurrent_appends_keep_both_sub_tasks() {
        let Some(state) = test_state().await else { return };
        let (user, task_id) = seed_task(&state).await;

        let (a, b) = tokio::join!(
            add_sub_task(
                State(state.clone()),
                Extension(user.clone()),
                Path(task_id),
                Json(input("first errand", 9, TaskStatus::New)),
            ),
            add_sub_task(
                State(state.clone()),
                Extension(user.clone()),
                Path(task_id),
                Json(input("second errand", 10, TaskStatus::New)),
            ),
        );
        assert!(a.is_ok(), "first append should succeed");
        assert!(b.is_ok(), "second append should succeed");

        let parent = sqlx::query_as::<_, DailyTask>("SELECT * FROM daily_tasks WHERE id = $1")
            .bind(task_id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(
            parent.sub_tasks.0.len(),
            2,
            "neither concurrent append may overwrite the other"
        );
    }

    #[tokio::test]
    async fn search_filters_by_status_and_case_insensitive_substring() {
        let Some(state) = test_state().await else { return };
        let (user, task_id) = seed_task(&state).await;

        for (name, hour, status) in [
            ("Buy milk", 9, TaskStatus::InProgress),
            ("Grind MILLET", 10, TaskStatus::InProgress),
            ("Walk dog", 11, TaskStatus::InProgress),
            ("milk the cow", 12, TaskStatus::Completed),
        ] {
            add_sub_task(
                State(state.clone()),
                Extension(user.clone()),
                Path(task_id),
                Json(input(name, hour, status)),
            )
            .await
            .unwrap();
        }

        let results = list_sub_tasks_by_status(
            State(state.clone()),
            Extension(user),
            Path(TaskStatus::InProgress),
            Query(SubTaskSearchQuery {
                search: Some("mil".into()),
            }),
        )
        .await
        .unwrap();

        let names: Vec<&str> = results.0.iter().map(|t| t.task_name.as_str()).collect();
        assert_eq!(names, vec!["Buy milk", "Grind MILLET"]);
        assert!(results.0.iter().all(|t| t.status == TaskStatus::InProgress));
    }
}
