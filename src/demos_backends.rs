//! Compiled-in backends for the bundled example widgets under `demos/`.
//!
//! Grounded on `example_widgets/system-monitor/backend.py` and
//! `example_widgets/dashboard/backend.py`. Per spec.md §9's REDESIGN
//! FLAGS, the Python `WidgetBackend` classes (discovered by dynamic
//! import of a widget's `backend.py`) become two ordinary Rust types
//! implementing [`crate::browser::WidgetBackend`], registered under a
//! fixed string key a manifest's `backend` field names.

use serde_json::{json, Value};
use sysinfo::{Disks, ProcessRefreshKind, RefreshKind, System};

use crate::browser::{Binding, BackendRegistry, WidgetBackend};

/// Backend for `demos/system-monitor`. Most of that widget's data arrives
/// via the `system`/`datetime` state namespaces (see
/// [`crate::system_services`]); this backend only adds the two
/// host-identity lookups that state pushes don't cover.
pub struct SystemMonitorBackend;

impl WidgetBackend for SystemMonitorBackend {
    fn bindings(&self) -> &'static [Binding] {
        &[
            Binding { name: "get_hostname", returns_value: true },
            Binding { name: "get_username", returns_value: true },
        ]
    }

    fn call(&self, method: &str, _args: Value) -> Result<Value, String> {
        match method {
            "get_hostname" => Ok(Value::String(
                std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string()),
            )),
            "get_username" => Ok(Value::String(
                std::env::var("USERNAME").unwrap_or_else(|_| "unknown".to_string()),
            )),
            other => Err(format!("unknown method '{}'", other)),
        }
    }
}

/// Backend for `demos/dashboard`: top processes by CPU, static system
/// info, and disk partition usage — none of which are pushed through the
/// `system` namespace since they are per-call snapshots, not ticking
/// state.
pub struct DashboardBackend;

impl WidgetBackend for DashboardBackend {
    fn bindings(&self) -> &'static [Binding] {
        &[
            Binding { name: "get_top_processes", returns_value: true },
            Binding { name: "get_system_info", returns_value: true },
            Binding { name: "get_disk_partitions", returns_value: true },
        ]
    }

    fn call(&self, method: &str, args: Value) -> Result<Value, String> {
        match method {
            "get_top_processes" => {
                let count = args
                    .get("count")
                    .and_then(Value::as_u64)
                    .unwrap_or(8) as usize;
                Ok(Value::Array(top_processes(count)))
            }
            "get_system_info" => Ok(system_info()),
            "get_disk_partitions" => Ok(Value::Array(disk_partitions())),
            other => Err(format!("unknown method '{}'", other)),
        }
    }
}

fn top_processes(count: usize) -> Vec<Value> {
    let refresh = RefreshKind::new().with_processes(
        ProcessRefreshKind::new().with_cpu().with_memory(),
    );
    let mut system = System::new_with_specifics(refresh);
    system.refresh_processes_specifics(
        sysinfo::ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new().with_cpu().with_memory(),
    );

    let mut procs: Vec<Value> = system
        .processes()
        .values()
        .map(|p| {
            json!({
                "pid": p.pid().as_u32(),
                "name": p.name().to_string_lossy(),
                "cpu": round1(p.cpu_usage()),
                "mem_kb": p.memory() / 1024,
            })
        })
        .collect();

    procs.sort_by(|a, b| {
        let ca = a["cpu"].as_f64().unwrap_or(0.0);
        let cb = b["cpu"].as_f64().unwrap_or(0.0);
        cb.partial_cmp(&ca).unwrap_or(std::cmp::Ordering::Equal)
    });
    procs.truncate(count);
    procs
}

fn system_info() -> Value {
    let mut system = System::new_with_specifics(RefreshKind::new());
    system.refresh_memory();
    json!({
        "os": System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
        "kernel_version": System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
        "host_name": System::host_name().unwrap_or_else(|| "unknown".to_string()),
        "cpu_count": system.cpus().len(),
        "ram_total_mb": system.total_memory() / (1024 * 1024),
    })
}

fn disk_partitions() -> Vec<Value> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .map(|d| {
            let total = d.total_space();
            let available = d.available_space();
            let used = total.saturating_sub(available);
            let percent = if total > 0 {
                round1((used as f64 / total as f64 * 100.0) as f32)
            } else {
                0.0
            };
            json!({
                "mount_point": d.mount_point().to_string_lossy(),
                "file_system": d.file_system().to_string_lossy(),
                "total": total,
                "used": used,
                "percent": percent,
            })
        })
        .collect()
}

fn round1(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

/// Register every bundled demo backend under the key a `widget.json`'s
/// `backend` field names.
pub fn register_all(registry: &mut BackendRegistry) {
    registry.register("system-monitor", || Box::new(SystemMonitorBackend));
    registry.register("dashboard", || Box::new(DashboardBackend));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_monitor_rejects_unknown_method() {
        let backend = SystemMonitorBackend;
        assert!(backend.call("bogus", Value::Null).is_err());
    }

    #[test]
    fn dashboard_get_top_processes_returns_array() {
        let backend = DashboardBackend;
        let result = backend.call("get_top_processes", json!({"count": 3})).unwrap();
        assert!(result.is_array());
        assert!(result.as_array().unwrap().len() <= 3);
    }

    #[test]
    fn dashboard_get_system_info_has_expected_keys() {
        let backend = DashboardBackend;
        let result = backend.call("get_system_info", Value::Null).unwrap();
        assert!(result.get("os").is_some());
        assert!(result.get("cpu_count").is_some());
    }

    #[test]
    fn round1_rounds_to_one_decimal() {
        assert_eq!(round1(33.36), 33.4);
    }
}
