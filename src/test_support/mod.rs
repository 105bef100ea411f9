//! Test utilities shared across crate-level unit tests.

#[cfg(not(target_arch = "wasm32"))]
pub mod http;

use std::collections::HashSet;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::logger::{set_log_level, set_user_log_handler, LogCallbackParams, LogLevel};
use crate::martech::data_layer::reset_page_globals;
use crate::martech::driver::ScriptDriver;
use crate::martech::error::{script_load_error, MartechResult};

#[cfg(not(target_arch = "wasm32"))]
pub use http::start_mock_server;

static GLOBAL_STATE_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Serializes tests touching page globals or logging, and resets both on entry.
pub fn global_state_guard() -> MutexGuard<'static, ()> {
    let guard = GLOBAL_STATE_MUTEX
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    reset_page_globals();
    set_user_log_handler(None, None);
    let _ = set_log_level(LogLevel::Info);
    guard
}

/// Routes every log call at or above debug level into the returned buffer.
pub fn capture_logs() -> Arc<Mutex<Vec<LogCallbackParams>>> {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    set_user_log_handler(
        Some(Arc::new(move |params: LogCallbackParams| {
            sink.lock().unwrap().push(params)
        })),
        Some(LogLevel::Debug),
    );
    captured
}

/// Records every script handed to it. Selected sources fail or never complete.
#[derive(Clone, Debug, Default)]
pub struct RecordingScriptDriver {
    requests: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    hanging: Arc<Mutex<HashSet<String>>>,
}

impl RecordingScriptDriver {
    pub fn failing(self, src: &str) -> Self {
        self.failing.lock().unwrap().insert(src.to_string());
        self
    }

    pub fn hanging(self, src: &str) -> Self {
        self.hanging.lock().unwrap().insert(src.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ScriptDriver for RecordingScriptDriver {
    async fn load(&self, src: &str) -> MartechResult<()> {
        self.requests.lock().unwrap().push(src.to_string());
        let hangs = self.hanging.lock().unwrap().contains(src);
        if hangs {
            futures::future::pending::<()>().await;
        }
        let fails = self.failing.lock().unwrap().contains(src);
        if fails {
            return Err(script_load_error(format!("Failed to load script: {src}")));
        }
        Ok(())
    }
}
