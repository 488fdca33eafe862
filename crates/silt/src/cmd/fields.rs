//! Fields command - dynamic field statistics and promotion candidates

use anyhow::Result;
use clap::Args;
use silt_config::Config;
use silt_protocol::FieldStatistic;
use silt_schema::PromotionCandidate;

use super::Components;

#[derive(Args, Debug)]
pub struct FieldsArgs {
    /// Usage threshold for candidates (defaults to schema.promotion_threshold)
    #[arg(long)]
    pub threshold: Option<u64>,

    /// List every tracked field instead of candidates
    #[arg(long)]
    pub all: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: FieldsArgs, config: Config) -> Result<()> {
    let components = Components::open(&config).await?;

    if args.all {
        let fields = components.registry.fields().await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&fields)?);
        } else {
            print!("{}", render_fields(&fields));
        }
    } else {
        let threshold = args.threshold.unwrap_or(config.schema.promotion_threshold);
        let candidates = components.registry.analyze(threshold).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&candidates)?);
        } else if candidates.is_empty() {
            println!("no fields used more than {} times", threshold);
        } else {
            print!("{}", render_candidates(&candidates));
        }
    }

    components.store.close().await;
    Ok(())
}

fn render_fields(fields: &[FieldStatistic]) -> String {
    let mut out = format!(
        "{:<32} {:<9} {:>10} {:<20} {:<8}\n",
        "NAME", "TYPE", "USAGE", "LAST SEEN", "PROMOTED"
    );
    for field in fields {
        out.push_str(&format!(
            "{:<32} {:<9} {:>10} {:<20} {:<8}\n",
            field.name,
            field.inferred_type.as_str(),
            field.usage_count,
            field.last_seen_at.format("%Y-%m-%d %H:%M:%S"),
            if field.promoted { "yes" } else { "no" }
        ));
    }
    out
}

fn render_candidates(candidates: &[PromotionCandidate]) -> String {
    let mut out = format!("{:<32} {:<9} {:>10} {:>8}\n", "NAME", "TYPE", "USAGE", "PRIORITY");
    for c in candidates {
        out.push_str(&format!(
            "{:<32} {:<9} {:>10} {:>8.1}\n",
            c.field.name, c.field.inferred_type.as_str(), c.field.usage_count, c.priority
        ));
    }
    out
}
