//! Phased loading of Google Analytics 4 and Google Tag Manager into a page.
//!
//! [`GtmMartech`] owns the normalized configuration and exposes three lifecycle phases:
//!
//! - [`GtmMartech::eager`] injects the `gtag.js` measurement script for every tag and
//!   queues its `config` command.
//! - [`GtmMartech::lazy`] resolves visitor consent, starts Tag Manager (`gtm.start`), loads
//!   the lazy containers and begins decorating loaded page content.
//! - [`GtmMartech::delayed`] loads the low-priority containers (`gtm.delayed.start`).
//!
//! Every phase is idempotent: scripts are requested at most once per instance and failed
//! loads never stop a phase from completing. Page-global state (data layers and the `gtag`
//! function) lives in a process-wide registry; [`reset_page_globals`] tears it down.
//!
//! ```
//! use gtm_martech::dom::Document;
//! use gtm_martech::martech::{ContainersOption, GtmMartech, InertScriptDriver, MartechOptions};
//! use std::sync::Arc;
//!
//! let document = Document::new();
//! let martech = GtmMartech::with_script_driver(
//!     MartechOptions {
//!         tags: "G-EXAMPLE".into(),
//!         containers: ContainersOption::phased("GTM-LAZY", "GTM-LATER"),
//!         ..Default::default()
//!     },
//!     document.clone(),
//!     Arc::new(InertScriptDriver),
//! );
//!
//! futures::executor::block_on(async {
//!     martech.eager().await;
//!     martech.lazy().await;
//!     martech.delayed().await;
//! });
//! assert_eq!(martech.loaded_resources().len(), 3);
//! ```

mod api;
mod config;
mod consent;
pub mod constants;
pub mod data_layer;
mod decorate;
pub mod driver;
pub mod error;
mod logger;
mod scripts;

pub use api::GtmMartech;
pub use config::{
    ConsentCallback, Containers, ContainersOption, DecorateCallback, MartechConfig,
    MartechOptions, OneOrMany, PhasedContainers,
};
pub use consent::{default_consent, ConsentSettings};
pub use data_layer::{
    data_layer, gtag, push_to_data_layer, reset_page_globals, DataLayer, DataLayerEntry,
    DataLayerRegistry, GlobalDataLayerRegistry,
};
pub use decorate::{is_decorated, is_decoration_candidate, ElementDecorationObserver};
pub use driver::{default_script_driver, HttpScriptDriver, InertScriptDriver, ScriptDriver};
#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
pub use driver::WebScriptDriver;
pub use error::{MartechError, MartechErrorCode, MartechResult};
pub use logger::LOGGER;
pub use scripts::{head_scripts, script_url, ScriptLoad, ScriptLoader};
