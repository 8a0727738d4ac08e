use crate::cli::OutputFormat;

mod human;
mod json;

use rawload_core::runner::NormalizedConfig;
use rawload_core::{EventFn, Results};

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, request_id: &str, method: &str, url: &str, plan: &NormalizedConfig);
    fn events(&self) -> EventFn;
    fn print_summary(&self, results: &Results) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
