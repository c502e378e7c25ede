use crate::{auth::auth, models::{DiagnosticsResponse, ErrorResponse}, state::AppState};
use axum::{extract::{State, Extension}, http::StatusCode, Json};
use chrono::Utc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Service diagnostics
pub async fn diagnostics(
    State(state): State<AppState>,
    Extension(roles): Extension<Vec<String>>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    // Ensure the caller is an admin
    auth::ensure_admin(&roles)?;

    // Aggregate diagnostics from the registry
    let stats = state.registry().stats();
    let n_access_cache = state.access_cache.as_ref().map_or(0, |c| c.entry_count()) as u32;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds();

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Rooms: {}, Users: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        stats.connections,
        stats.rooms,
        stats.users
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn: stats.connections as u32,
            n_rooms: stats.rooms as u32,
            n_users: stats.users as u32,
            n_unjoined_conn: stats.unjoined as u32,
            n_access_cache,
            uptime_secs,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
