#[path = "capture_budget.rs"]
mod capture_budget;
#[path = "capture_reduce.rs"]
mod capture_reduce;
#[path = "capture_reducer.rs"]
mod capture_reducer;
#[path = "capture_system.rs"]
mod capture_system;

#[allow(unused_imports)]
pub use capture_budget::{
    BudgetPolicy, ClipMode, ClipSide, ClippedOutput, choose_clip_side, clip_text,
};
#[allow(unused_imports)]
pub use capture_reducer::{
    CaptureProviderMode, ReducerConfig, ReducerStatus, probe_reducer, should_use_reducer,
};
#[allow(unused_imports)]
pub use capture_system::{CaptureProvider, CapturedOutput, capture_command, text_len};
