use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::auth::middleware::AuthUser;
use crate::dto::CountResponse;
use crate::error::AppResult;
use crate::models::daily_task::TaskStatus;
use crate::AppState;

/// Count of the caller's daily tasks in the given status. Zero matches is a
/// zero count, never an error.
pub async fn count_daily_tasks(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(status): Path<TaskStatus>,
) -> AppResult<Json<CountResponse>> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM daily_tasks WHERE user_id = $1 AND status = $2",
    )
    .bind(auth_user.id)
    .bind(status)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(CountResponse { count }))
}

/// Count of the caller's sub-tasks in the given status, across all daily
/// tasks: unwind the embedded arrays, filter, count.
pub async fn count_sub_tasks(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(status): Path<TaskStatus>,
) -> AppResult<Json<CountResponse>> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM daily_tasks t
        CROSS JOIN LATERAL jsonb_array_elements(t.sub_tasks) AS st(elem)
        WHERE t.user_id = $1 AND st.elem->>'status' = $2
        "#,
    )
    .bind(auth_user.id)
    .bind(status.as_str())
    .fetch_one(&state.db)
    .await?;

    Ok(Json(CountResponse { count }))
}
