mod app;
mod error;
mod util;

#[path = "modules/alert.rs"]
mod alert;
#[path = "modules/capture.rs"]
mod capture;
#[path = "modules/config.rs"]
mod config;
#[path = "modules/execmeta.rs"]
mod execmeta;
#[path = "modules/execution.rs"]
mod execution;
#[path = "modules/llm.rs"]
mod llm;
#[path = "modules/logs.rs"]
mod logs;
#[path = "modules/logview.rs"]
mod logview;
#[path = "modules/paths.rs"]
mod paths;
#[path = "modules/process.rs"]
mod process;
#[path = "modules/prompting.rs"]
mod prompting;
#[path = "modules/provider_adapter.rs"]
mod provider_adapter;
#[path = "modules/quarantine.rs"]
mod quarantine;
#[path = "modules/runlog.rs"]
mod runlog;
#[path = "modules/runtime_controls.rs"]
mod runtime_controls;
#[path = "modules/schema.rs"]
mod schema;
#[path = "modules/structured_replay.rs"]
mod structured_replay;
#[path = "modules/types.rs"]
mod types;

fn main() {
    std::process::exit(app::run());
}
