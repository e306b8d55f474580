use std::time::Duration;

use relay_core::config::AppConfig;
use relay_core::{BroadcastPolicy, Locale};

/// The slice of configuration the engine reads on every event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelaySettings {
    pub policy: BroadcastPolicy,
    pub locale: Locale,
    pub delivery_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            policy: BroadcastPolicy::default(),
            locale: Locale::default(),
            delivery_timeout: Duration::from_secs(20),
        }
    }
}

impl RelaySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            policy: config.policy.clone(),
            locale: config.locale,
            delivery_timeout: Duration::from_secs(config.platform.delivery_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relay_core::config::AppConfig;
    use relay_core::Locale;

    use super::RelaySettings;

    #[test]
    fn settings_follow_loaded_config() {
        let mut config = AppConfig::default();
        config.locale = Locale::CsCz;
        config.platform.delivery_timeout_secs = 7;
        config.policy.destination.restrict_to_own_org = true;

        let settings = RelaySettings::from_config(&config);

        assert_eq!(settings.locale, Locale::CsCz);
        assert_eq!(settings.delivery_timeout, Duration::from_secs(7));
        assert!(settings.policy.destination.restrict_to_own_org);
    }
}
