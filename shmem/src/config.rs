use serde_derive::{Deserialize, Serialize};

use crate::errors::{KernelError, Result};
use crate::model::TABLE_COUNT;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilityConfig {
    pub log_level: String,
    /// The facility closes itself after this many seconds; 0 runs until
    /// SIGINT/SIGTERM.
    pub run_seconds: u64,
    pub queue_capacity: u32,
    pub max_active_workers: u32,
    pub spawn_interval_min_ms: u64,
    pub spawn_interval_max_ms: u64,
    pub vip_percent: u32,
    pub belt_length: usize,
    pub belt_tick_ms: u64,
    pub base_items_per_cycle: u32,
    pub kitchen_cook_ms: u64,
    pub pass_capacity: u32,
    pub cloakroom_hooks: u32,
    pub party_dwell_ms: u64,
    pub special_order_percent: u32,
    pub supervisor_interval_ms: u64,
    pub queue_high_watermark: u32,
    pub queue_low_watermark: u32,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        FacilityConfig {
            log_level: "info".to_string(),
            run_seconds: 30,
            queue_capacity: 10,
            max_active_workers: 32,
            spawn_interval_min_ms: 100,
            spawn_interval_max_ms: 600,
            vip_percent: 2,
            belt_length: 16,
            belt_tick_ms: 200,
            base_items_per_cycle: 2,
            kitchen_cook_ms: 150,
            pass_capacity: 24,
            cloakroom_hooks: 40,
            party_dwell_ms: 8_000,
            special_order_percent: 10,
            supervisor_interval_ms: 1_000,
            queue_high_watermark: 12,
            queue_low_watermark: 3,
        }
    }
}

impl FacilityConfig {
    pub fn load(path: &str) -> Result<FacilityConfig> {
        let cfg: FacilityConfig = confy::load_path(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(KernelError::Config("queue_capacity must be positive".into()));
        }
        if self.max_active_workers == 0 || self.pass_capacity == 0 {
            return Err(KernelError::Config(
                "max_active_workers and pass_capacity must be positive".into(),
            ));
        }
        if self.belt_length < TABLE_COUNT {
            return Err(KernelError::Config(format!(
                "belt_length {} is shorter than the {} tables it serves",
                self.belt_length, TABLE_COUNT
            )));
        }
        if self.spawn_interval_min_ms > self.spawn_interval_max_ms {
            return Err(KernelError::Config(
                "spawn_interval_min_ms exceeds spawn_interval_max_ms".into(),
            ));
        }
        if self.cloakroom_hooks < crate::model::MAX_PARTY_SIZE {
            return Err(KernelError::Config(
                "cloakroom_hooks cannot hold the largest party".into(),
            ));
        }
        if self.vip_percent > 100 || self.special_order_percent > 100 {
            return Err(KernelError::Config("percentages must be within 0..=100".into()));
        }
        if self.belt_tick_ms == 0 || self.base_items_per_cycle == 0 {
            return Err(KernelError::Config("the belt must move and carry plates".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FacilityConfig::default().validate().unwrap();
    }

    #[test]
    fn short_belt_is_rejected() {
        let cfg = FacilityConfig {
            belt_length: TABLE_COUNT - 1,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(KernelError::Config(_))));
    }

    #[test]
    fn load_writes_defaults_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kaiten.toml");
        let cfg = FacilityConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.queue_capacity, FacilityConfig::default().queue_capacity);
        assert!(path.exists());
    }

    #[test]
    fn load_reads_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kaiten.toml");
        std::fs::write(&path, "run_seconds = 3\nqueue_capacity = 4\n").unwrap();
        let cfg = FacilityConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.run_seconds, 3);
        assert_eq!(cfg.queue_capacity, 4);
        assert_eq!(cfg.belt_length, 16);
    }
}
