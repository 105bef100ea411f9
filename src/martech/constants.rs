pub const DEFAULT_DATA_LAYER_NAME: &str = "gtmDataLayer";

/// Name of the page-global dispatch function installed by the data layer bridge.
pub const GTAG_FUNCTION_NAME: &str = "gtag";

pub const GTAG_SCRIPT_URL: &str = "https://www.googletagmanager.com/gtag/js";
pub const GTM_SCRIPT_URL: &str = "https://www.googletagmanager.com/gtm.js";

pub const SECTION_STATUS_ATTRIBUTE: &str = "data-section-status";
pub const BLOCK_STATUS_ATTRIBUTE: &str = "data-block-status";
pub const LOADED_STATUS: &str = "loaded";
pub const FRAGMENT_WRAPPER_CLASS: &str = "fragment-wrapper";
pub const DECORATED_ATTRIBUTE: &str = "data-martech-decorated";

pub const NO_TAG_MESSAGE: &str = "No GA4 tag provided.";
pub const ANALYTICS_DISABLED_MESSAGE: &str = "Analytics is disabled in the martech config";
