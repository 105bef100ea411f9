use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat};
use futures::future::join_all;
use serde_json::{json, Value};

use crate::dom::Document;
use crate::martech::config::{MartechConfig, MartechOptions};
use crate::martech::consent::{consent_command, emit_default_consent, resolve_consent, ConsentSettings};
use crate::martech::constants::{
    ANALYTICS_DISABLED_MESSAGE, GTAG_SCRIPT_URL, GTM_SCRIPT_URL, NO_TAG_MESSAGE,
};
use crate::martech::data_layer::{DataLayer, DataLayerEntry, GlobalDataLayerRegistry};
use crate::martech::decorate::ElementDecorationObserver;
use crate::martech::driver::{default_script_driver, ScriptDriver};
use crate::martech::scripts::{script_url, ScriptLoad, ScriptLoader};
use crate::martech::LOGGER;
use crate::platform::runtime;
use crate::util::console_assert;

/// Loads GA4 and Tag Manager into a page in three priority phases.
///
/// `eager` loads the measurement scripts, `lazy` resolves consent, loads the lazy containers
/// and starts element decoration, `delayed` loads the remaining containers. Each phase may be
/// called in any order, repeatedly or concurrently; every script is requested at most once
/// per instance.
#[derive(Clone)]
pub struct GtmMartech {
    inner: Arc<GtmMartechInner>,
}

struct GtmMartechInner {
    config: MartechConfig,
    document: Document,
    registry: GlobalDataLayerRegistry,
    scripts: ScriptLoader,
    loaded: Mutex<Vec<String>>,
    decoration_started: AtomicBool,
    decoration: Mutex<Option<ElementDecorationObserver>>,
}

impl fmt::Debug for GtmMartech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GtmMartech")
            .field("config", &self.inner.config)
            .field("loaded", &self.loaded_resources())
            .finish()
    }
}

impl GtmMartech {
    /// Sets up the page data layer using the platform's default script driver.
    pub fn new(options: MartechOptions, document: Document) -> Self {
        Self::with_script_driver(options, document, default_script_driver())
    }

    pub fn with_script_driver(
        options: MartechOptions,
        document: Document,
        driver: Arc<dyn ScriptDriver>,
    ) -> Self {
        let config = MartechConfig::from_options(options);
        console_assert(&LOGGER, !config.tags().is_empty(), NO_TAG_MESSAGE);

        let registry = GlobalDataLayerRegistry::shared();
        let data_layer = registry.inner().init(config.data_layer_instance_name());
        emit_default_consent(&config, &data_layer);
        data_layer.push_arguments(vec![json!("js"), js_date_now()]);

        let scripts = ScriptLoader::new(document.clone(), driver);
        Self {
            inner: Arc::new(GtmMartechInner {
                config,
                document,
                registry,
                scripts,
                loaded: Mutex::new(Vec::new()),
                decoration_started: AtomicBool::new(false),
                decoration: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &MartechConfig {
        &self.inner.config
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    /// The page-global data layer this instance dispatches to. Resolved on every call, so
    /// after [`crate::martech::reset_page_globals`] writes land in a fresh layer of the same name.
    pub fn data_layer(&self) -> DataLayer {
        self.inner
            .registry
            .inner()
            .get_or_create(self.inner.config.data_layer_instance_name())
    }

    /// `true` once a lazy phase has started element decoration.
    pub fn is_decorating(&self) -> bool {
        self.inner.decoration.lock().unwrap().is_some()
    }

    /// Script URLs requested so far, in request order.
    pub fn loaded_resources(&self) -> Vec<String> {
        self.inner.loaded.lock().unwrap().clone()
    }

    /// Loads one measurement script per tag and configures each tag with the page metadata.
    pub async fn eager(&self) {
        let config = &self.inner.config;
        if !config.analytics() {
            LOGGER.warn(ANALYTICS_DISABLED_MESSAGE);
            return;
        }

        let mut loads = Vec::new();
        for tag in config.tags() {
            loads.extend(self.request_script(GTAG_SCRIPT_URL, tag));
            self.data_layer().push_arguments(vec![
                json!("config"),
                json!(tag),
                Value::Object(config.page_metadata().clone()),
            ]);
        }
        join_all(loads).await;
    }

    /// Applies the visitor's consent, starts Tag Manager and loads the lazy containers.
    pub async fn lazy(&self) {
        if let Some(settings) = resolve_consent(&self.inner.config).await {
            self.update_user_consent(&settings);
        }

        self.data_layer()
            .push(json!({"event": "gtm.js", "gtm.start": runtime::now_millis()}));
        self.start_decoration();

        let config = &self.inner.config;
        if !config.analytics() {
            LOGGER.warn(ANALYTICS_DISABLED_MESSAGE);
            return;
        }
        let loads = self.request_containers(&config.containers().lazy);
        join_all(loads).await;
    }

    /// Loads the delayed containers, if any.
    pub async fn delayed(&self) {
        let config = &self.inner.config;
        if !config.analytics() {
            LOGGER.warn(ANALYTICS_DISABLED_MESSAGE);
            return;
        }
        let containers = &config.containers().delayed;
        if containers.is_empty() {
            return;
        }

        self.data_layer()
            .push(json!({"event": "gtm.js", "gtm.delayed.start": runtime::now_millis()}));
        let loads = self.request_containers(containers);
        join_all(loads).await;
    }

    pub fn update_user_consent(&self, settings: &ConsentSettings) {
        self.data_layer()
            .push_arguments(consent_command("update", settings));
    }

    /// Appends `payload` to this instance's page data layer.
    pub fn push_to_data_layer(&self, payload: impl Into<DataLayerEntry>) {
        self.data_layer().push(payload);
    }

    fn request_containers(&self, containers: &[String]) -> Vec<ScriptLoad> {
        containers
            .iter()
            .filter_map(|container| self.request_script(GTM_SCRIPT_URL, container))
            .collect()
    }

    /// Claims the script for `id` and starts loading it. `None` when this instance already
    /// requested it.
    fn request_script(&self, base: &str, id: &str) -> Option<ScriptLoad> {
        let name = self.inner.config.data_layer_instance_name();
        let url = match script_url(base, &[("id", id), ("l", name)]) {
            Ok(url) => url,
            Err(err) => {
                LOGGER.warn(format!("Skipping script for {id}: {err}"));
                return None;
            }
        };

        {
            let mut loaded = self.inner.loaded.lock().unwrap();
            if loaded.contains(&url) {
                return None;
            }
            loaded.push(url.clone());
        }
        Some(self.inner.scripts.load(&url))
    }

    fn start_decoration(&self) {
        let Some(callback) = self.inner.config.decorate_callback() else {
            return;
        };
        if self.inner.decoration_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let observer = ElementDecorationObserver::start(&self.inner.document, Arc::clone(callback));
        *self.inner.decoration.lock().unwrap() = Some(observer);
    }
}

/// `new Date()` as it appears once a data layer is serialized.
fn js_date_now() -> Value {
    DateTime::from_timestamp_millis(runtime::now_millis())
        .map(|date| Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)))
        .unwrap_or(Value::Null)
}
