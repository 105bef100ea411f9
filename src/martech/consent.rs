use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::martech::config::MartechConfig;
use crate::martech::data_layer::DataLayer;
use crate::martech::error::MartechResult;
use crate::martech::LOGGER;

/// Consent state keyed by consent type (`analytics_storage`, `ad_storage`, ...), with values
/// `"granted"` or `"denied"`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsentSettings {
    pub entries: BTreeMap<String, String>,
}

impl ConsentSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, consent_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(consent_type.into(), value.into());
        self
    }

    pub fn get(&self, consent_type: &str) -> Option<&str> {
        self.entries.get(consent_type).map(String::as_str)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect::<Map<_, _>>(),
        )
    }
}

impl<K, V> FromIterator<(K, V)> for ConsentSettings
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Consent applied before the visitor has decided: nothing is stored.
pub fn default_consent() -> ConsentSettings {
    [
        ("ad_storage", "denied"),
        ("ad_user_data", "denied"),
        ("ad_personalization", "denied"),
        ("analytics_storage", "denied"),
    ]
    .into_iter()
    .collect()
}

pub(crate) fn consent_command(mode: &str, settings: &ConsentSettings) -> Vec<Value> {
    vec![json!("consent"), json!(mode), settings.to_value()]
}

/// Queues `['consent', 'default', ...]` when analytics and consent handling are both on.
pub(crate) fn emit_default_consent(config: &MartechConfig, layer: &DataLayer) {
    if config.analytics() && config.consent() {
        layer.push_arguments(consent_command("default", &default_consent()));
    }
}

/// Runs the page's consent callback, if consent handling applies. Failures and undecided
/// visitors both yield `None`.
pub(crate) async fn resolve_consent(config: &MartechConfig) -> Option<ConsentSettings> {
    if !config.analytics() || !config.consent() {
        return None;
    }
    let callback = config.consent_callback()?;
    let outcome: MartechResult<Option<ConsentSettings>> = callback().await;
    match outcome {
        Ok(settings) => settings,
        Err(err) => {
            // Consent stays at its defaults; the phase carries on.
            LOGGER.warn(format!("Consent callback failed: {err}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::martech::config::MartechOptions;
    use crate::martech::error::consent_callback_error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn defaults_deny_every_storage_type() {
        let defaults = default_consent();
        assert_eq!(defaults.entries.len(), 4);
        assert!(defaults.entries.values().all(|value| value == "denied"));
        assert_eq!(
            consent_command("default", &defaults)[2]["analytics_storage"],
            json!("denied")
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn callback_is_skipped_when_consent_disabled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let options = MartechOptions {
            consent: false,
            ..Default::default()
        }
        .with_consent_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Some(ConsentSettings::new().with("analytics_storage", "granted"))) }
        });

        assert_eq!(resolve_consent(&MartechConfig::from_options(options)).await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn callback_failure_resolves_to_none() {
        let options = MartechOptions::default()
            .with_consent_callback(|| async { Err(consent_callback_error("cmp offline")) });
        assert_eq!(resolve_consent(&MartechConfig::from_options(options)).await, None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn callback_result_is_returned_untouched() {
        let granted = ConsentSettings::new()
            .with("analytics_storage", "granted")
            .with("ad_storage", "denied");
        let expected = granted.clone();
        let options = MartechOptions::default().with_consent_callback(move || {
            let granted = granted.clone();
            async move { Ok(Some(granted)) }
        });

        assert_eq!(
            resolve_consent(&MartechConfig::from_options(options)).await,
            Some(expected)
        );
    }
}
