use std::sync::Arc;

use agent_runtime::AgentRuntime;
use agent_runtime_mock::{MockRuntime, MOCK_RUNTIME_ID};

pub const DEFAULT_RUNTIME_ID: &str = MOCK_RUNTIME_ID;
pub const RUNTIME_ENV_VAR: &str = "CODING_AGENT_RUNTIME";

/// Builds the runtime registered under `runtime_id`.
pub fn runtime_for_id(runtime_id: &str) -> Result<Arc<dyn AgentRuntime>, String> {
    match runtime_id {
        MOCK_RUNTIME_ID => Ok(Arc::new(MockRuntime::default())),
        unknown => Err(format!(
            "Unsupported runtime '{unknown}'. Available runtimes: {MOCK_RUNTIME_ID}"
        )),
    }
}
