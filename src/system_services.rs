//! Periodically samples system data and produces state updates for
//! widgets subscribed to a `datetime` or `system` state namespace.
//!
//! Grounded on `system_services.py`. The teacher's per-metric modules
//! (`modules/battery.rs`, `disk.rs`, `network.rs`, `system_info.rs`)
//! supply the concrete Windows/`sysinfo` sampling calls; this module
//! replaces the teacher's "render into a cached string for this bar
//! segment" outcome with "produce a namespaced key/value state update",
//! since PytoniumShell pushes state into web views rather than painting
//! GDI text itself.

use chrono::Local;
use serde_json::Value;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};
use windows::Win32::System::Power::{GetSystemPowerStatus, SYSTEM_POWER_STATUS};

use std::time::{Duration, Instant};

/// A single `(namespace, key, value)` push destined for every widget
/// subscribed to `namespace` via its manifest's `state_namespaces`.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub namespace: &'static str,
    pub key: &'static str,
    pub value: Value,
}

pub struct SystemServices {
    system: System,
    networks: Networks,
    poll_interval: Duration,
    last_poll: Instant,
    running: bool,
}

impl SystemServices {
    pub fn new() -> Self {
        let refresh = RefreshKind::new()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        Self {
            system: System::new_with_specifics(refresh),
            networks: Networks::new_with_refreshed_list(),
            poll_interval: Duration::from_secs(1),
            // Forces the first `poll()` call to sample immediately.
            last_poll: Instant::now() - Duration::from_secs(3600),
            running: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.last_poll = Instant::now() - Duration::from_secs(3600);
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Called once per main-loop tick. Returns an empty vec unless the
    /// poll interval has elapsed.
    pub fn poll(&mut self) -> Vec<StateUpdate> {
        if !self.running || self.last_poll.elapsed() < self.poll_interval {
            return Vec::new();
        }
        self.last_poll = Instant::now();

        let mut updates = self.poll_datetime();
        updates.extend(self.poll_cpu());
        updates.extend(self.poll_memory());
        updates.extend(self.poll_disk());
        updates.extend(self.poll_network());
        updates.extend(self.poll_battery());
        updates
    }

    fn poll_datetime(&self) -> Vec<StateUpdate> {
        let now = Local::now();
        vec![
            StateUpdate {
                namespace: "datetime",
                key: "time",
                value: Value::String(now.format("%H:%M").to_string()),
            },
            StateUpdate {
                namespace: "datetime",
                key: "time_seconds",
                value: Value::String(now.format("%H:%M:%S").to_string()),
            },
            StateUpdate {
                namespace: "datetime",
                key: "date",
                value: Value::String(now.format("%d.%m.%Y").to_string()),
            },
            StateUpdate {
                namespace: "datetime",
                key: "day",
                value: Value::String(now.format("%A").to_string()),
            },
        ]
    }

    fn poll_cpu(&mut self) -> Vec<StateUpdate> {
        self.system.refresh_cpu_usage();
        let per_cpu: Vec<Value> = self
            .system
            .cpus()
            .iter()
            .map(|c| Value::from(round1(c.cpu_usage())))
            .collect();
        let avg = if per_cpu.is_empty() {
            0.0
        } else {
            self.system.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / per_cpu.len() as f32
        };
        vec![
            StateUpdate {
                namespace: "system",
                key: "cpu_percent",
                value: Value::Array(per_cpu),
            },
            StateUpdate {
                namespace: "system",
                key: "cpu_avg",
                value: Value::from(round1(avg)),
            },
        ]
    }

    fn poll_memory(&mut self) -> Vec<StateUpdate> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        vec![
            StateUpdate { namespace: "system", key: "mem_total", value: Value::from(total) },
            StateUpdate { namespace: "system", key: "mem_used", value: Value::from(used) },
            StateUpdate {
                namespace: "system",
                key: "mem_percent",
                value: Value::from(round1(percent as f32)),
            },
        ]
    }

    fn poll_disk(&self) -> Vec<StateUpdate> {
        let disks = Disks::new_with_refreshed_list();
        let Some(disk) = disks.iter().max_by_key(|d| d.total_space()) else {
            return Vec::new();
        };
        let total = disk.total_space();
        let available = disk.available_space();
        let used = total.saturating_sub(available);
        let percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        vec![
            StateUpdate { namespace: "system", key: "disk_total", value: Value::from(total) },
            StateUpdate { namespace: "system", key: "disk_used", value: Value::from(used) },
            StateUpdate {
                namespace: "system",
                key: "disk_percent",
                value: Value::from(round1(percent as f32)),
            },
        ]
    }

    fn poll_network(&mut self) -> Vec<StateUpdate> {
        self.networks.refresh(true);
        let (sent, recv) = self
            .networks
            .iter()
            .fold((0u64, 0u64), |(s, r), (_, data)| {
                (s + data.total_transmitted(), r + data.total_received())
            });
        vec![
            StateUpdate { namespace: "system", key: "net_sent", value: Value::from(sent) },
            StateUpdate { namespace: "system", key: "net_recv", value: Value::from(recv) },
        ]
    }

    fn poll_battery(&self) -> Vec<StateUpdate> {
        let mut status = SYSTEM_POWER_STATUS::default();
        let ok = unsafe { GetSystemPowerStatus(&mut status).is_ok() };
        if !ok {
            return Vec::new();
        }
        let has_battery = status.BatteryFlag != 128 && status.BatteryFlag != 255;
        if !has_battery {
            return Vec::new();
        }

        let mut updates = Vec::new();
        if status.BatteryLifePercent != 255 {
            updates.push(StateUpdate {
                namespace: "system",
                key: "battery_percent",
                value: Value::from(status.BatteryLifePercent as u32),
            });
        }
        updates.push(StateUpdate {
            namespace: "system",
            key: "battery_charging",
            value: Value::from(status.ACLineStatus == 1),
        });
        updates
    }
}

impl Default for SystemServices {
    fn default() -> Self {
        Self::new()
    }
}

fn round1(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round1_rounds_to_one_decimal() {
        assert_eq!(round1(12.34), 12.3);
        assert_eq!(round1(12.36), 12.4);
    }

    #[test]
    fn stopped_service_polls_nothing() {
        let mut services = SystemServices::new();
        assert!(services.poll().is_empty());
    }

    #[test]
    fn first_poll_after_start_is_immediate() {
        let mut services = SystemServices::new();
        services.start();
        let updates = services.poll();
        assert!(updates.iter().any(|u| u.namespace == "datetime" && u.key == "time"));
    }

    #[test]
    fn second_poll_within_interval_is_empty() {
        let mut services = SystemServices::new();
        services.start();
        let _ = services.poll();
        assert!(services.poll().is_empty());
    }
}
