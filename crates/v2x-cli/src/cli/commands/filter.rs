//! `v2x filter` - publish and query signed-record filters.

use anyhow::{Context as _, Result};

use super::Context;
use crate::cli::args::{FilterArgs, FilterCommands};
use crate::output;
use v2x_trust::SignedRecordFilter;

pub fn execute(ctx: Context, args: FilterArgs) -> Result<()> {
    let config = &ctx.config;
    match args.command {
        FilterCommands::Build {
            elements,
            rate,
            out,
        } => {
            let n = elements.unwrap_or(config.filter.expected_elements);
            let p = rate.unwrap_or(config.filter.false_positive_rate);
            let path = out.unwrap_or_else(|| config.auth.bloom_filter_path());

            let filter = SignedRecordFilter::publish(
                n,
                p,
                &[config.expected_answer.as_str()],
                &mut rand::thread_rng(),
            )?;
            filter
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;

            output::print_field(ctx.output, "bits", filter.bits_len());
            output::print_field(ctx.output, "hashes", filter.hash_count());
            output::print_field(ctx.output, "records", filter.inserted());
            output::print_field(ctx.output, "written", path.display().to_string());
        }
        FilterCommands::Check { record, filter } => {
            let path = filter.unwrap_or_else(|| config.auth.bloom_filter_path());
            let filter = SignedRecordFilter::load(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let verdict = if filter.probably_contains(&record) {
                "present"
            } else {
                "absent"
            };
            output::print_field(ctx.output, "record", verdict);
        }
    }
    Ok(())
}
