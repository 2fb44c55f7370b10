use tb_core::updater::{Git2WorkingCopy, UpdateSupervisor};
use tb_telemetry::logging::LogContext;

use super::GlobalOptions;

pub fn run(global: &GlobalOptions, json_output: bool) -> anyhow::Result<()> {
    let logs = LogContext::console_only("turbo", &global.log_level);

    let report = logs.scope(|| {
        UpdateSupervisor::new(Git2WorkingCopy, global.rules()).report(&global.repo)
    });

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}
