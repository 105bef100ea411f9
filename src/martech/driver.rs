use std::sync::Arc;

use async_trait::async_trait;

use crate::martech::error::{script_load_error, MartechResult};

/// The mechanism that actually fetches and runs an injected script. The loader hands every
/// newly inserted `<script>` to its driver exactly once and treats both outcomes alike.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ScriptDriver: Send + Sync {
    async fn load(&self, src: &str) -> MartechResult<()>;
}

/// Fetches scripts over HTTP without evaluating them.
#[derive(Clone, Debug, Default)]
pub struct HttpScriptDriver {
    client: reqwest::Client,
}

impl HttpScriptDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ScriptDriver for HttpScriptDriver {
    async fn load(&self, src: &str) -> MartechResult<()> {
        let response = self
            .client
            .get(src)
            .send()
            .await
            .map_err(|err| script_load_error(format!("failed to fetch script {src}: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(script_load_error(format!(
            "script request for {src} failed with status {status}"
        )))
    }
}

/// Reports every script as loaded without fetching anything. Useful when rendering pages
/// ahead of time and in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct InertScriptDriver;

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ScriptDriver for InertScriptDriver {
    async fn load(&self, _src: &str) -> MartechResult<()> {
        Ok(())
    }
}

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
pub fn default_script_driver() -> Arc<dyn ScriptDriver> {
    Arc::new(web::WebScriptDriver)
}

#[cfg(not(all(feature = "wasm-web", target_arch = "wasm32")))]
pub fn default_script_driver() -> Arc<dyn ScriptDriver> {
    Arc::new(HttpScriptDriver::new())
}

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
pub use web::WebScriptDriver;

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
mod web {
    use std::cell::RefCell;
    use std::rc::Rc;

    use futures::channel::oneshot;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;

    use super::*;

    /// Mirrors each script into the browser's real `document.head` and waits for its
    /// `load` or `error` event.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct WebScriptDriver;

    #[async_trait(?Send)]
    impl ScriptDriver for WebScriptDriver {
        async fn load(&self, src: &str) -> MartechResult<()> {
            let window =
                web_sys::window().ok_or_else(|| script_load_error("Window not available"))?;
            let document = window
                .document()
                .ok_or_else(|| script_load_error("Document not available"))?;

            if document
                .query_selector(&format!("head > script[src=\"{src}\"]"))
                .ok()
                .flatten()
                .is_some()
            {
                return Ok(());
            }

            let script = document
                .create_element("script")
                .map_err(|err| script_load_error(format!("Failed to create script: {err:?}")))?
                .dyn_into::<web_sys::HtmlScriptElement>()
                .map_err(|_| script_load_error("Script element has wrong type"))?;
            script.set_src(src);
            script
                .set_attribute("async", "true")
                .map_err(|err| script_load_error(format!("Failed to set async: {err:?}")))?;

            let (sender, receiver) = oneshot::channel::<MartechResult<()>>();
            let sender = Rc::new(RefCell::new(Some(sender)));
            let success_sender = sender.clone();
            let onload = Closure::wrap(Box::new(move || {
                if let Some(tx) = success_sender.borrow_mut().take() {
                    let _ = tx.send(Ok(()));
                }
            }) as Box<dyn FnMut()>);

            let error_sender = sender.clone();
            let failed_src = src.to_string();
            let onerror = Closure::wrap(Box::new(move || {
                if let Some(tx) = error_sender.borrow_mut().take() {
                    let _ = tx.send(Err(script_load_error(format!(
                        "Failed to load script: {failed_src}"
                    ))));
                }
            }) as Box<dyn FnMut()>);

            script.set_onload(Some(onload.as_ref().unchecked_ref()));
            script.set_onerror(Some(onerror.as_ref().unchecked_ref()));
            onload.forget();
            onerror.forget();

            let head = document
                .head()
                .ok_or_else(|| script_load_error("No <head> element found"))?;
            head.append_child(&script).map_err(|err| {
                script_load_error(format!("Failed to append script to <head>: {err:?}"))
            })?;

            receiver
                .await
                .map_err(|_| script_load_error("Script loading channel dropped"))?
        }
    }
}
