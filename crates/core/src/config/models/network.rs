use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 每个中继目标的HTTP超时
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("中继超时时间必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeoverConfig {
    /// 探测已有实例 `/version` 的超时
    pub probe_timeout_ms: u64,
    /// 等待端口释放时的轮询间隔
    pub poll_interval_ms: u64,
    /// 等待端口释放的最长时间
    pub max_wait_ms: u64,
}

impl Default for TakeoverConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 2_000,
            poll_interval_ms: 100,
            max_wait_ms: 15_000,
        }
    }
}

impl TakeoverConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.probe_timeout_ms == 0 {
            return Err(anyhow::anyhow!("接管探测超时必须大于0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("端口轮询间隔必须大于0"));
        }
        if self.max_wait_ms < self.poll_interval_ms {
            return Err(anyhow::anyhow!("端口最长等待时间不能小于轮询间隔"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// 建立存活连接的最长时间
    pub max_init_ms: u64,
    /// 允许的最长静默时间，探测间隔为它的一半
    pub max_silence_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            max_init_ms: 10_000,
            max_silence_ms: 3_000,
        }
    }
}

impl HeartbeatConfig {
    pub fn max_init(&self) -> Duration {
        Duration::from_millis(self.max_init_ms)
    }

    pub fn max_silence(&self) -> Duration {
        Duration::from_millis(self.max_silence_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_init_ms == 0 {
            return Err(anyhow::anyhow!("存活连接初始化时间必须大于0"));
        }
        if self.max_silence_ms < 2 {
            return Err(anyhow::anyhow!("存活连接静默时间至少为2毫秒"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RelayConfig::default().validate().is_ok());
        assert!(TakeoverConfig::default().validate().is_ok());
        assert!(HeartbeatConfig::default().validate().is_ok());
    }

    #[test]
    fn test_takeover_wait_shorter_than_poll() {
        let config = TakeoverConfig {
            poll_interval_ms: 500,
            max_wait_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.max_silence(), Duration::from_secs(3));
        assert_eq!(TakeoverConfig::default().max_wait(), Duration::from_secs(15));
    }
}
