//! Runs the three loading phases against an in-memory page and prints what was injected.
//! Scripts are not fetched: the inert driver reports every load as finished.

use std::sync::Arc;

use gtm_martech::martech::{
    head_scripts, ContainersOption, GtmMartech, InertScriptDriver, MartechOptions,
};
use gtm_martech::dom::Document;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = MartechOptions::from_json(
        r#"{
            "tags": ["G-DEMO1", "G-DEMO2", "G-DEMO1"],
            "containers": {"lazy": "GTM-LAZY", "delayed": ["GTM-LATER"]},
            "pageMetadata": {"page_type": "landing"}
        }"#,
    )?;

    let document = Document::new();
    let martech =
        GtmMartech::with_script_driver(options, document.clone(), Arc::new(InertScriptDriver));

    martech.eager().await;
    martech.lazy().await;
    martech.delayed().await;
    // Repeated phases are no-ops for script loading.
    martech.eager().await;

    println!("Injected scripts:");
    for script in head_scripts(&document) {
        println!("- {}", script.get_attribute("src").unwrap_or_default());
    }
    println!("Data layer ({}):", martech.data_layer().name());
    for entry in martech.data_layer().entries() {
        println!("  {entry:?}");
    }

    Ok(())
}
