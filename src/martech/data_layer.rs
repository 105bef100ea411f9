//! Page-global data layers and the `gtag` dispatch function.
//!
//! A browser page keeps these on `window`: one array per data layer name and a single
//! `gtag` function appending its arguments to whichever array it was bound to. Here they
//! live in an explicit process-wide registry so hosts and tests can inspect and tear them
//! down.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

use serde_json::Value;

use crate::martech::constants::GTAG_FUNCTION_NAME;
use crate::martech::error::{not_a_function, MartechResult};

/// One element of a data layer array. Payloads are stored as handed over: nothing is
/// serialized, copied or inspected.
#[derive(Clone)]
pub enum DataLayerEntry {
    /// The argument list of one `gtag(...)` call.
    Arguments(Vec<Value>),
    /// An object, primitive or `null` pushed directly.
    Value(Arc<Value>),
    Undefined,
    /// A host value the loader cannot represent; kept by reference.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl DataLayerEntry {
    pub fn opaque<T>(value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        DataLayerEntry::Opaque(value)
    }

    pub fn as_arguments(&self) -> Option<&[Value]> {
        match self {
            DataLayerEntry::Arguments(args) => Some(args),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            DataLayerEntry::Value(value) => Some(value),
            _ => None,
        }
    }

    /// `true` when this entry holds the very allocation `other` points at.
    pub fn is_same_value(&self, other: &Arc<Value>) -> bool {
        matches!(self, DataLayerEntry::Value(value) if Arc::ptr_eq(value, other))
    }

    pub fn is_same_opaque<T>(&self, other: &Arc<T>) -> bool
    where
        T: Any + Send + Sync,
    {
        match self {
            DataLayerEntry::Opaque(value) => std::ptr::addr_eq(Arc::as_ptr(value), Arc::as_ptr(other)),
            _ => false,
        }
    }
}

impl fmt::Debug for DataLayerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLayerEntry::Arguments(args) => f.debug_tuple("Arguments").field(args).finish(),
            DataLayerEntry::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DataLayerEntry::Undefined => f.write_str("Undefined"),
            DataLayerEntry::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<Value> for DataLayerEntry {
    fn from(value: Value) -> Self {
        DataLayerEntry::Value(Arc::new(value))
    }
}

impl From<Arc<Value>> for DataLayerEntry {
    fn from(value: Arc<Value>) -> Self {
        DataLayerEntry::Value(value)
    }
}

impl From<Option<Value>> for DataLayerEntry {
    fn from(value: Option<Value>) -> Self {
        value.map(DataLayerEntry::from).unwrap_or(DataLayerEntry::Undefined)
    }
}

impl From<()> for DataLayerEntry {
    fn from(_: ()) -> Self {
        DataLayerEntry::Undefined
    }
}

/// Handle to one named, append-only data layer array.
#[derive(Clone)]
pub struct DataLayer {
    name: String,
    entries: Arc<Mutex<Vec<DataLayerEntry>>>,
}

impl fmt::Debug for DataLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLayer")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

impl DataLayer {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&self, payload: impl Into<DataLayerEntry>) {
        self.entries.lock().unwrap().push(payload.into());
    }

    pub(crate) fn push_arguments(&self, args: Vec<Value>) {
        self.push(DataLayerEntry::Arguments(args));
    }

    pub fn entries(&self) -> Vec<DataLayerEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Argument lists of `gtag` calls whose leading arguments equal `prefix`.
    pub fn commands(&self, prefix: &[&str]) -> Vec<Vec<Value>> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(DataLayerEntry::as_arguments)
            .filter(|args| {
                args.len() >= prefix.len()
                    && prefix
                        .iter()
                        .zip(args.iter())
                        .all(|(expected, actual)| actual.as_str() == Some(*expected))
            })
            .map(<[Value]>::to_vec)
            .collect()
    }

    /// Directly pushed objects whose `event` field equals `name`.
    pub fn events(&self, name: &str) -> Vec<Value> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(DataLayerEntry::as_value)
            .filter(|value| value.get("event").and_then(Value::as_str) == Some(name))
            .cloned()
            .collect()
    }

    fn shares_storage_with(&self, other: &DataLayer) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

#[derive(Debug, Default)]
struct PageGlobals {
    data_layers: HashMap<String, DataLayer>,
    gtag: Option<DataLayer>,
}

/// Registry of the page's data layers and of the `gtag` binding.
#[derive(Debug, Default)]
pub struct DataLayerRegistry {
    state: Mutex<PageGlobals>,
}

impl DataLayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named data layer, creating it when the page has none yet. Existing
    /// entries (for example ones a page queued before the loader ran) are kept.
    pub fn get_or_create(&self, name: &str) -> DataLayer {
        let mut state = self.state.lock().unwrap();
        state
            .data_layers
            .entry(name.to_string())
            .or_insert_with(|| DataLayer::new(name))
            .clone()
    }

    /// Ensures the named data layer exists and binds `gtag` to it.
    pub fn init(&self, name: &str) -> DataLayer {
        let mut state = self.state.lock().unwrap();
        let layer = state
            .data_layers
            .entry(name.to_string())
            .or_insert_with(|| DataLayer::new(name))
            .clone();
        state.gtag = Some(layer.clone());
        layer
    }

    pub fn data_layer(&self, name: &str) -> Option<DataLayer> {
        self.state.lock().unwrap().data_layers.get(name).cloned()
    }

    pub fn push(&self, name: &str, payload: impl Into<DataLayerEntry>) {
        self.get_or_create(name).push(payload);
    }

    /// Invokes the page's `gtag` function. Fails like calling an undefined global when no
    /// loader has installed it.
    pub fn gtag(&self, args: Vec<Value>) -> MartechResult<()> {
        let target = self.state.lock().unwrap().gtag.clone();
        match target {
            Some(layer) => {
                layer.push_arguments(args);
                Ok(())
            }
            None => Err(not_a_function(GTAG_FUNCTION_NAME)),
        }
    }

    /// Name of the data layer `gtag` currently appends to.
    pub fn gtag_target(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        let target = state.gtag.as_ref()?;
        state
            .data_layers
            .values()
            .find(|layer| layer.shares_storage_with(target))
            .map(|layer| layer.name().to_string())
    }

    /// Drops every data layer and uninstalls `gtag`.
    pub fn reset(&self) {
        *self.state.lock().unwrap() = PageGlobals::default();
    }
}

#[derive(Clone, Debug)]
pub struct GlobalDataLayerRegistry(Arc<DataLayerRegistry>);

impl GlobalDataLayerRegistry {
    pub fn shared() -> Self {
        static INSTANCE: LazyLock<Arc<DataLayerRegistry>> =
            LazyLock::new(|| Arc::new(DataLayerRegistry::new()));
        Self(INSTANCE.clone())
    }

    pub fn inner(&self) -> &DataLayerRegistry {
        &self.0
    }
}

/// Calls the page-global `gtag` function with `args`.
pub fn gtag<I>(args: I) -> MartechResult<()>
where
    I: IntoIterator<Item = Value>,
{
    GlobalDataLayerRegistry::shared()
        .inner()
        .gtag(args.into_iter().collect())
}

/// Appends `payload` to the page-global data layer `name`, creating it if needed.
pub fn push_to_data_layer(name: &str, payload: impl Into<DataLayerEntry>) {
    GlobalDataLayerRegistry::shared().inner().push(name, payload);
}

pub fn data_layer(name: &str) -> Option<DataLayer> {
    GlobalDataLayerRegistry::shared().inner().data_layer(name)
}

/// Clears every page-global data layer and uninstalls `gtag`.
pub fn reset_page_globals() {
    GlobalDataLayerRegistry::shared().inner().reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gtag_fails_before_init() {
        let registry = DataLayerRegistry::new();
        let err = registry.gtag(vec![json!("js")]).unwrap_err();
        assert_eq!(err.code_str(), "martech/not-a-function");
        assert_eq!(err.message(), "gtag is not a function");
    }

    #[test]
    fn init_preserves_pre_seeded_entries() {
        let registry = DataLayerRegistry::new();
        registry.push("dl", json!({"event": "page.seeded"}));

        let layer = registry.init("dl");
        registry.init("dl");
        registry.gtag(vec![json!("event"), json!("click")]).unwrap();

        assert_eq!(layer.len(), 2);
        assert_eq!(layer.events("page.seeded").len(), 1);
        assert_eq!(layer.commands(&["event", "click"]).len(), 1);
    }

    #[test]
    fn gtag_follows_the_last_initialized_layer() {
        let registry = DataLayerRegistry::new();
        let first = registry.init("first");
        let second = registry.init("second");
        registry.gtag(vec![json!("js")]).unwrap();

        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
        assert_eq!(registry.gtag_target().as_deref(), Some("second"));
    }

    #[test]
    fn payloads_are_stored_by_reference() {
        struct Widget;

        let registry = DataLayerRegistry::new();
        let object = Arc::new(json!({"event": "custom", "nested": {"depth": 1}}));
        let widget = Arc::new(Widget);
        registry.push("dl", object.clone());
        registry.push("dl", DataLayerEntry::opaque(widget.clone()));
        registry.push("dl", Value::Null);
        registry.push("dl", json!(42));
        registry.push("dl", ());

        let entries = registry.data_layer("dl").unwrap().entries();
        assert_eq!(entries.len(), 5);
        assert!(entries[0].is_same_value(&object));
        assert!(entries[1].is_same_opaque(&widget));
        assert_eq!(entries[2].as_value(), Some(&Value::Null));
        assert_eq!(entries[3].as_value(), Some(&json!(42)));
        assert!(matches!(entries[4], DataLayerEntry::Undefined));
    }

    #[test]
    fn reset_uninstalls_gtag_and_drops_layers() {
        let registry = DataLayerRegistry::new();
        registry.init("dl");
        registry.reset();
        assert!(registry.data_layer("dl").is_none());
        assert!(registry.gtag(Vec::new()).is_err());
    }
}
