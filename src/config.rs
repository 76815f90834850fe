use std::env;
use std::time::Duration;

pub const DEFAULT_BROKER_HOST: &str = "broker.MQTTGO.io";
pub const DEFAULT_TOPIC_PREFIX: &str = "ShangHuYun/DEoP";

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub topics: Topics,
    pub harness: HarnessConfig,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

/// Control and acknowledgement topics, all rooted at one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub settle_secs: u64,
    pub step_delay_secs: u64,
    pub wait_for_ack: bool,
    pub extended: bool,
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn wifi_control(&self) -> String {
        format!("{}/Sub/wifi/control", self.prefix)
    }

    pub fn led_control(&self) -> String {
        format!("{}/Sub/led/control", self.prefix)
    }

    pub fn rec_control(&self) -> String {
        format!("{}/Sub/rec/control", self.prefix)
    }

    pub fn ack(&self) -> String {
        format!("{}/Pub/ack", self.prefix)
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_PREFIX)
    }
}

impl HarnessConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_secs(self.step_delay_secs)
    }
}

fn var_optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.is_empty())
}

fn var_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn var_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> bool {
    matches!(
        var_optional(lookup, key)
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source. Every
    /// variable is optional; defaults reproduce the stock test run.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let config = Self {
            mqtt: MqttConfig {
                broker_host: var_or_default(
                    &lookup,
                    "MQTT_BROKER_HOST",
                    DEFAULT_BROKER_HOST.to_string(),
                ),
                broker_port: var_or_default(&lookup, "MQTT_BROKER_PORT", 1883),
                username: var_optional(&lookup, "MQTT_USERNAME"),
                password: var_optional(&lookup, "MQTT_PASSWORD"),
                client_id: var_optional(&lookup, "MQTT_CLIENT_ID")
                    .unwrap_or_else(|| format!("deop-harness-{}", std::process::id())),
                keep_alive_secs: var_or_default(&lookup, "MQTT_KEEP_ALIVE_SECS", 60),
            },
            topics: Topics::new(var_or_default(
                &lookup,
                "DEOP_TOPIC_PREFIX",
                DEFAULT_TOPIC_PREFIX.to_string(),
            )),
            harness: HarnessConfig {
                settle_secs: var_or_default(&lookup, "HARNESS_SETTLE_SECS", 2),
                step_delay_secs: var_or_default(&lookup, "HARNESS_STEP_DELAY_SECS", 3),
                wait_for_ack: var_flag(&lookup, "HARNESS_WAIT_FOR_ACK"),
                extended: var_flag(&lookup, "HARNESS_EXTENDED"),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.mqtt.broker_host.trim().is_empty() {
            return Err("MQTT_BROKER_HOST must not be empty".into());
        }
        if self.topics.prefix.is_empty() {
            return Err("DEOP_TOPIC_PREFIX must not be empty".into());
        }
        if self.mqtt.keep_alive_secs == 0 {
            return Err("MQTT_KEEP_ALIVE_SECS must be > 0".into());
        }
        if self.harness.step_delay_secs == 0 {
            return Err("HARNESS_STEP_DELAY_SECS must be > 0".into());
        }
        if self.mqtt.username.is_some() != self.mqtt.password.is_some() {
            return Err("MQTT_USERNAME and MQTT_PASSWORD must be set together".into());
        }
        Ok(())
    }
}
