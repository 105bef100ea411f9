//! Shows consent resolution during the lazy phase and decoration of page sections as they
//! finish loading.

use std::sync::Arc;

use gtm_martech::dom::Document;
use gtm_martech::martech::{ConsentSettings, GtmMartech, InertScriptDriver, MartechOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = MartechOptions {
        tags: "G-DEMO".into(),
        containers: "GTM-DEMO".into(),
        ..Default::default()
    }
    .with_consent_callback(|| async {
        // A consent manager would be asked here.
        Ok(Some(
            ConsentSettings::new()
                .with("analytics_storage", "granted")
                .with("ad_storage", "denied"),
        ))
    })
    .with_decorate_callback(|element| {
        println!(
            "decorating <{}> {:?}",
            element.tag_name(),
            element.get_attribute("id")
        );
    });

    let document = Document::new();
    let hero = document.create_element("section");
    hero.set_attribute("id", "hero");
    hero.set_attribute("data-section-status", "loaded");
    document.body().append_child(&hero)?;

    let martech =
        GtmMartech::with_script_driver(options, document.clone(), Arc::new(InertScriptDriver));
    martech.lazy().await;

    let teaser = document.create_element("div");
    teaser.set_attribute("id", "teaser");
    hero.append_child(&teaser)?;
    teaser.set_attribute("data-block-status", "loaded");
    document.flush_mutations();

    println!(
        "consent updates: {:?}",
        martech.data_layer().commands(&["consent", "update"])
    );

    Ok(())
}
