use std::sync::Arc;

use runnel_state::StateContainer;
use runnel_step::StepContext;
use tokio_util::sync::CancellationToken;

pub(crate) fn ctx(state: StateContainer) -> StepContext {
  StepContext {
    run_id: "run".to_string(),
    flow_id: "flow".to_string(),
    step_id: "step".to_string(),
    invocation_id: "inv".to_string(),
    state: Arc::new(state),
    cancel: CancellationToken::new(),
  }
}
