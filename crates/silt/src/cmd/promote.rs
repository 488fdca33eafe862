//! Promote command - flag high-priority fields as promoted

use anyhow::Result;
use clap::Args;
use silt_config::Config;

use super::Components;

#[derive(Args, Debug)]
pub struct PromoteArgs {
    /// Usage threshold for candidates (defaults to schema.promotion_threshold)
    #[arg(long)]
    pub threshold: Option<u64>,

    /// Show what would be promoted without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: PromoteArgs, config: Config) -> Result<()> {
    let components = Components::open(&config).await?;
    let threshold = args.threshold.unwrap_or(config.schema.promotion_threshold);
    let cutoff = config.schema.auto_promote_cutoff;

    if args.dry_run {
        let candidates = components.registry.analyze(threshold).await?;
        for c in candidates.iter().filter(|c| c.priority > cutoff) {
            println!("would promote {} (priority {:.1})", c.field.name, c.priority);
        }
    } else {
        let promoted = components.registry.auto_promote(threshold).await?;
        println!("promoted {} fields (priority above {:.1})", promoted, cutoff);
    }

    components.store.close().await;
    Ok(())
}
