// Integration tests for assetdag, compiled as one test binary.

mod build_pipeline;
mod config_errors;
mod fs_abstraction;
mod graph_run;
mod runtime_fake_executor;
mod watch_rebuild;
