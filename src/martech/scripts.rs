use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{FutureExt, Shared};
use url::Url;

use crate::dom::{Document, Element};
use crate::martech::driver::ScriptDriver;
use crate::martech::error::{invalid_config, MartechResult};

#[cfg(not(target_arch = "wasm32"))]
type LoadFuture = futures::future::BoxFuture<'static, ()>;
#[cfg(target_arch = "wasm32")]
type LoadFuture = futures::future::LocalBoxFuture<'static, ()>;

/// Completion of one script load. Cloning shares the same underlying load.
pub type ScriptLoad = Shared<LoadFuture>;

/// Builds `base?k1=v1&k2=v2`, percent-encoding the values.
pub fn script_url(base: &str, params: &[(&str, &str)]) -> MartechResult<String> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|err| invalid_config(format!("invalid script url {base}: {err}")))
}

/// `<script>` elements currently under the document head, in insertion order.
pub fn head_scripts(document: &Document) -> Vec<Element> {
    document
        .head()
        .children()
        .into_iter()
        .filter(|element| element.tag_name() == "script")
        .collect()
}

/// Inserts `<script async>` elements into the page head, at most one per `src`.
pub struct ScriptLoader {
    document: Document,
    driver: Arc<dyn ScriptDriver>,
    in_flight: Mutex<HashMap<String, ScriptLoad>>,
}

impl fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptLoader")
            .field("requested", &self.in_flight.lock().unwrap().len())
            .finish()
    }
}

impl ScriptLoader {
    pub fn new(document: Document, driver: Arc<dyn ScriptDriver>) -> Self {
        Self {
            document,
            driver,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Requests the script at `src`.
    ///
    /// The element is inserted before this returns, so a second call for the same `src` (even
    /// one racing the first) reuses the pending load instead of adding another element. The
    /// returned future resolves once the driver reports either outcome: load failures are not
    /// surfaced to callers.
    pub fn load(&self, src: &str) -> ScriptLoad {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(pending) = in_flight.get(src) {
            return pending.clone();
        }

        let exists = head_scripts(&self.document)
            .iter()
            .any(|script| script.get_attribute("src").as_deref() == Some(src));
        if exists {
            return resolved();
        }

        let script = self.document.create_element("script");
        script.set_attribute("src", src);
        script.set_attribute("async", "true");
        if let Err(err) = self.document.head().append_child(&script) {
            log::debug!("could not insert script {src}: {err}");
            return resolved();
        }

        let driver = Arc::clone(&self.driver);
        let owned_src = src.to_string();
        let load = boxed(async move {
            // Failed loads resolve like successful ones; phases never wait on a retry.
            if let Err(err) = driver.load(&owned_src).await {
                log::debug!("script {owned_src} failed to load: {err}");
            }
        })
        .shared();
        in_flight.insert(src.to_string(), load.clone());
        load
    }
}

fn resolved() -> ScriptLoad {
    boxed(futures::future::ready(())).shared()
}

#[cfg(not(target_arch = "wasm32"))]
fn boxed<F>(future: F) -> LoadFuture
where
    F: Future<Output = ()> + Send + 'static,
{
    future.boxed()
}

#[cfg(target_arch = "wasm32")]
fn boxed<F>(future: F) -> LoadFuture
where
    F: Future<Output = ()> + 'static,
{
    future.boxed_local()
}
