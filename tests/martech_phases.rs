use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use gtm_martech::dom::Document;
use gtm_martech::martech::{
    data_layer, gtag, head_scripts, push_to_data_layer, reset_page_globals, ContainersOption,
    GtmMartech, InertScriptDriver, MartechOptions,
};
use serde_json::json;

static PAGE_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

fn fresh_page() -> MutexGuard<'static, ()> {
    let guard = PAGE_MUTEX.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    reset_page_globals();
    guard
}

fn start(options: MartechOptions) -> (GtmMartech, Document) {
    let document = Document::new();
    let martech =
        GtmMartech::with_script_driver(options, document.clone(), Arc::new(InertScriptDriver));
    (martech, document)
}

fn srcs(document: &Document) -> Vec<String> {
    head_scripts(document)
        .iter()
        .filter_map(|script| script.get_attribute("src"))
        .collect()
}

#[tokio::test(flavor = "current_thread")]
async fn eager_with_duplicate_tags_injects_two_scripts() {
    let _page = fresh_page();
    let (martech, document) = start(MartechOptions {
        tags: ["G-1", "G-2", "G-2"].into(),
        ..Default::default()
    });

    martech.eager().await;

    let scripts = srcs(&document);
    assert_eq!(scripts.len(), 2);
    assert!(scripts[0].contains("/gtag/js?id=G-1&"));
    assert!(scripts[1].contains("/gtag/js?id=G-2&"));
    assert!(head_scripts(&document)
        .iter()
        .all(|script| script.get_attribute("async").as_deref() == Some("true")));
}

#[tokio::test(flavor = "current_thread")]
async fn delayed_before_lazy_loads_each_container_once() {
    let _page = fresh_page();
    let (martech, document) = start(MartechOptions {
        tags: "G-1".into(),
        containers: ContainersOption::phased(["GTM-A"], ["GTM-B"]),
        ..Default::default()
    });

    martech.delayed().await;
    let scripts = srcs(&document);
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("id=GTM-B"));

    martech.lazy().await;
    martech.lazy().await;
    martech.delayed().await;
    let scripts = srcs(&document);
    assert_eq!(scripts.len(), 2);
    assert!(scripts[1].contains("id=GTM-A"));
}

#[tokio::test(flavor = "current_thread")]
async fn json_config_drives_the_same_phases() {
    let _page = fresh_page();
    let options = MartechOptions::from_json(
        r#"{"tags": "G-JSON", "containers": ["GTM-1", "GTM-2"], "dataLayerInstanceName": "jsonLayer"}"#,
    )
    .unwrap();
    let (martech, document) = start(options);

    martech.eager().await;
    martech.lazy().await;
    martech.delayed().await;

    assert_eq!(
        srcs(&document),
        [
            "https://www.googletagmanager.com/gtag/js?id=G-JSON&l=jsonLayer",
            "https://www.googletagmanager.com/gtm.js?id=GTM-1&l=jsonLayer",
            "https://www.googletagmanager.com/gtm.js?id=GTM-2&l=jsonLayer",
        ]
    );
    let layer = data_layer("jsonLayer").unwrap();
    assert!(layer
        .events("gtm.js")
        .iter()
        .all(|event| event.get("gtm.delayed.start").is_none()));
}

#[tokio::test(flavor = "current_thread")]
async fn gtag_is_only_callable_after_construction() {
    let _page = fresh_page();
    let err = gtag(vec![json!("event"), json!("too_early")]).unwrap_err();
    assert_eq!(err.to_string(), "gtag is not a function (martech/not-a-function)");

    push_to_data_layer("gtmDataLayer", json!({"event": "seeded"}));
    let (martech, _) = start(MartechOptions {
        tags: "G-1".into(),
        ..Default::default()
    });
    gtag(vec![json!("event"), json!("page_view")]).unwrap();

    let layer = martech.data_layer();
    assert_eq!(layer.events("seeded").len(), 1);
    assert_eq!(layer.commands(&["event", "page_view"]).len(), 1);
}

#[test]
fn unrecognized_config_shapes_are_rejected() {
    let err = MartechOptions::from_json(r#"{"containers": {"eager": "GTM-X"}}"#).unwrap_err();
    assert_eq!(err.code_str(), "martech/invalid-config");
    assert!(MartechOptions::from_json(r#"{"tags": 42}"#).is_err());
}
