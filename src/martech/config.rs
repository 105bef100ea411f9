use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::dom::Element;
use crate::martech::consent::ConsentSettings;
use crate::martech::constants::DEFAULT_DATA_LAYER_NAME;
use crate::martech::error::{invalid_config, MartechResult};

/// Resolves the visitor's consent choice. `Ok(None)` means "no decision yet".
pub type ConsentCallback =
    Arc<dyn Fn() -> BoxFuture<'static, MartechResult<Option<ConsentSettings>>> + Send + Sync>;

/// Invoked once per element that reaches the loaded state.
pub type DecorateCallback = Arc<dyn Fn(&Element) + Send + Sync>;

/// A single identifier or a list of them, as page configs commonly write either.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl OneOrMany {
    /// Canonical list: blanks dropped, duplicates removed keeping the first occurrence.
    fn normalize(self) -> Vec<String> {
        let raw = match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        };
        let mut out: Vec<String> = Vec::with_capacity(raw.len());
        for value in raw {
            let value = value.trim();
            if !value.is_empty() && !out.iter().any(|seen| seen == value) {
                out.push(value.to_string());
            }
        }
        out
    }
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

impl From<String> for OneOrMany {
    fn from(value: String) -> Self {
        OneOrMany::One(value)
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(values: Vec<String>) -> Self {
        OneOrMany::Many(values)
    }
}

impl From<Vec<&str>> for OneOrMany {
    fn from(values: Vec<&str>) -> Self {
        OneOrMany::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for OneOrMany {
    fn from(values: [&str; N]) -> Self {
        OneOrMany::Many(values.iter().map(|value| value.to_string()).collect())
    }
}

/// Container input: a bare identifier or list (both loaded in the lazy phase), or an
/// explicit split between lazy and delayed containers.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ContainersOption {
    One(String),
    Many(Vec<String>),
    Phased(PhasedContainers),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhasedContainers {
    #[serde(default)]
    pub lazy: OneOrMany,
    #[serde(default)]
    pub delayed: OneOrMany,
}

impl Default for ContainersOption {
    fn default() -> Self {
        ContainersOption::Phased(PhasedContainers::default())
    }
}

impl ContainersOption {
    pub fn phased(lazy: impl Into<OneOrMany>, delayed: impl Into<OneOrMany>) -> Self {
        ContainersOption::Phased(PhasedContainers {
            lazy: lazy.into(),
            delayed: delayed.into(),
        })
    }

    fn normalize(self) -> Containers {
        match self {
            ContainersOption::One(value) => Containers {
                lazy: OneOrMany::One(value).normalize(),
                delayed: Vec::new(),
            },
            ContainersOption::Many(values) => Containers {
                lazy: OneOrMany::Many(values).normalize(),
                delayed: Vec::new(),
            },
            ContainersOption::Phased(phased) => Containers {
                lazy: phased.lazy.normalize(),
                delayed: phased.delayed.normalize(),
            },
        }
    }
}

impl From<&str> for ContainersOption {
    fn from(value: &str) -> Self {
        ContainersOption::One(value.to_string())
    }
}

impl From<Vec<&str>> for ContainersOption {
    fn from(values: Vec<&str>) -> Self {
        ContainersOption::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ContainersOption {
    fn from(values: [&str; N]) -> Self {
        ContainersOption::Many(values.iter().map(|value| value.to_string()).collect())
    }
}

/// Raw loader options as a page supplies them.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MartechOptions {
    pub analytics: bool,
    pub tags: OneOrMany,
    pub containers: ContainersOption,
    pub data_layer_instance_name: String,
    pub consent: bool,
    #[serde(skip)]
    pub consent_callback: Option<ConsentCallback>,
    #[serde(skip)]
    pub decorate_callback: Option<DecorateCallback>,
    pub page_metadata: Map<String, Value>,
}

impl Default for MartechOptions {
    fn default() -> Self {
        Self {
            analytics: true,
            tags: OneOrMany::default(),
            containers: ContainersOption::default(),
            data_layer_instance_name: DEFAULT_DATA_LAYER_NAME.to_string(),
            consent: true,
            consent_callback: None,
            decorate_callback: None,
            page_metadata: Map::new(),
        }
    }
}

impl fmt::Debug for MartechOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MartechOptions")
            .field("analytics", &self.analytics)
            .field("tags", &self.tags)
            .field("containers", &self.containers)
            .field("data_layer_instance_name", &self.data_layer_instance_name)
            .field("consent", &self.consent)
            .field("consent_callback", &self.consent_callback.is_some())
            .field("decorate_callback", &self.decorate_callback.is_some())
            .field("page_metadata", &self.page_metadata)
            .finish()
    }
}

impl MartechOptions {
    /// Parses options from a JSON page config. Callbacks are not representable in JSON and
    /// must be attached afterwards.
    pub fn from_json(json: &str) -> MartechResult<Self> {
        serde_json::from_str(json)
            .map_err(|err| invalid_config(format!("invalid martech config: {err}")))
    }

    pub fn with_consent_callback<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MartechResult<Option<ConsentSettings>>> + Send + 'static,
    {
        self.consent_callback = Some(Arc::new(move || callback().boxed()));
        self
    }

    pub fn with_decorate_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Element) + Send + Sync + 'static,
    {
        self.decorate_callback = Some(Arc::new(callback));
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Containers {
    pub lazy: Vec<String>,
    pub delayed: Vec<String>,
}

/// Normalized, immutable loader configuration.
#[derive(Clone)]
pub struct MartechConfig {
    analytics: bool,
    tags: Vec<String>,
    containers: Containers,
    data_layer_instance_name: String,
    consent: bool,
    consent_callback: Option<ConsentCallback>,
    decorate_callback: Option<DecorateCallback>,
    page_metadata: Map<String, Value>,
}

impl fmt::Debug for MartechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MartechConfig")
            .field("analytics", &self.analytics)
            .field("tags", &self.tags)
            .field("containers", &self.containers)
            .field("data_layer_instance_name", &self.data_layer_instance_name)
            .field("consent", &self.consent)
            .finish_non_exhaustive()
    }
}

impl MartechConfig {
    pub fn from_options(options: MartechOptions) -> Self {
        let name = options.data_layer_instance_name.trim();
        let data_layer_instance_name = if name.is_empty() {
            DEFAULT_DATA_LAYER_NAME.to_string()
        } else {
            name.to_string()
        };

        Self {
            analytics: options.analytics,
            tags: options.tags.normalize(),
            containers: options.containers.normalize(),
            data_layer_instance_name,
            consent: options.consent,
            consent_callback: options.consent_callback,
            decorate_callback: options.decorate_callback,
            page_metadata: options.page_metadata,
        }
    }

    pub fn analytics(&self) -> bool {
        self.analytics
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn containers(&self) -> &Containers {
        &self.containers
    }

    pub fn data_layer_instance_name(&self) -> &str {
        &self.data_layer_instance_name
    }

    pub fn consent(&self) -> bool {
        self.consent
    }

    pub fn consent_callback(&self) -> Option<&ConsentCallback> {
        self.consent_callback.as_ref()
    }

    pub fn decorate_callback(&self) -> Option<&DecorateCallback> {
        self.decorate_callback.as_ref()
    }

    pub fn page_metadata(&self) -> &Map<String, Value> {
        &self.page_metadata
    }
}

impl From<MartechOptions> for MartechConfig {
    fn from(options: MartechOptions) -> Self {
        MartechConfig::from_options(options)
    }
}
