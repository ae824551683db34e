use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use tracing::warn;

use crate::policy::RefundTable;

/// Runtime settings, read once at startup from `RENTAL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Pending bookings older than this are failed by the sweeper. `None` disables it.
    pub hold_ttl: Option<TimeDelta>,
    pub sweep_interval: Duration,
    /// Journal appends before the compactor rewrites the log.
    pub compact_threshold: u64,
    pub refund_table: RefundTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            hold_ttl: Some(TimeDelta::minutes(30)),
            sweep_interval: Duration::from_secs(30),
            compact_threshold: 1000,
            refund_table: RefundTable::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.parse::<u64>().ok());

        let hold_ttl = match parsed("RENTAL_HOLD_TTL_SECS") {
            Some(0) => None,
            Some(secs) => Some(TimeDelta::seconds(secs.min(i64::MAX as u64 / 1000) as i64)),
            None => defaults.hold_ttl,
        };

        let refund_table = match lookup("RENTAL_REFUND_TABLE") {
            Some(raw) => match serde_json::from_str::<RefundTable>(&raw) {
                Ok(table) => match table.validate() {
                    Ok(()) => table,
                    Err(e) => {
                        warn!("ignoring RENTAL_REFUND_TABLE: {e}");
                        defaults.refund_table
                    }
                },
                Err(e) => {
                    warn!("ignoring RENTAL_REFUND_TABLE: {e}");
                    defaults.refund_table
                }
            },
            None => defaults.refund_table,
        };

        Self {
            data_dir: lookup("RENTAL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: lookup("RENTAL_METRICS_PORT").and_then(|s| s.parse().ok()),
            hold_ttl,
            sweep_interval: parsed("RENTAL_SWEEP_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            compact_threshold: parsed("RENTAL_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            refund_table,
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("rental.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(|_| None);
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.hold_ttl, Some(TimeDelta::minutes(30)));
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.refund_table, RefundTable::default());
        assert_eq!(cfg.journal_path(), PathBuf::from("./data/rental.wal"));
    }

    #[test]
    fn reads_values() {
        let cfg = Config::from_lookup(lookup(&[
            ("RENTAL_DATA_DIR", "/var/lib/rental"),
            ("RENTAL_METRICS_PORT", "9100"),
            ("RENTAL_HOLD_TTL_SECS", "600"),
            ("RENTAL_SWEEP_INTERVAL_SECS", "5"),
            ("RENTAL_COMPACT_THRESHOLD", "50"),
        ]));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/rental"));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.hold_ttl, Some(TimeDelta::seconds(600)));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(5));
        assert_eq!(cfg.compact_threshold, 50);
    }

    #[test]
    fn zero_ttl_disables_sweeper() {
        let cfg = Config::from_lookup(lookup(&[("RENTAL_HOLD_TTL_SECS", "0")]));
        assert_eq!(cfg.hold_ttl, None);
    }

    #[test]
    fn garbage_falls_back() {
        let cfg = Config::from_lookup(lookup(&[
            ("RENTAL_METRICS_PORT", "not-a-port"),
            ("RENTAL_COMPACT_THRESHOLD", "-3"),
            ("RENTAL_REFUND_TABLE", "{broken"),
        ]));
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.refund_table, RefundTable::default());
    }

    #[test]
    fn refund_table_from_json() {
        let mut table = RefundTable::default();
        table.strict.long_notice = dec!(0.25);
        table.long_notice_days = 14;
        let json = serde_json::to_string(&table).unwrap();

        let cfg = Config::from_lookup(lookup(&[("RENTAL_REFUND_TABLE", json.as_str())]));
        assert_eq!(cfg.refund_table, table);
    }

    #[test]
    fn invalid_refund_table_rejected() {
        let mut table = RefundTable::default();
        table.moderate.late = dec!(2);
        let json = serde_json::to_string(&table).unwrap();
        let cfg = Config::from_lookup(lookup(&[("RENTAL_REFUND_TABLE", json.as_str())]));
        assert_eq!(cfg.refund_table, RefundTable::default());
    }
}
