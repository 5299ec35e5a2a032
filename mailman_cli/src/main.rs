use std::{env::current_dir, fs::write, sync::Arc};

use anyhow::Result;
use clap::Parser;
use mailman_core::{
    calendar_builder::CalendarBuilder,
    clock::{Clock, SystemClock},
    config::CoreArgs,
    postal_code::PostalCode,
    schedule_fetcher::ScheduleFetcher,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Writes the upcoming mail delivery days of a postal code to calendar.ics")]
pub struct Arguments {
    /// the four-digit postal code
    pub postal_code: PostalCode,
    #[command(flatten)]
    pub core: CoreArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Arguments::parse();
    let config = args.core.into_config()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = ScheduleFetcher::from_config(&config, clock.clone())?;
    let dates = fetcher
        .get_schedule(&args.postal_code, config.fetcher.timeout)
        .await?;
    let calendar = CalendarBuilder::new(config.calendar, clock).build(&dates);
    let mut path = current_dir()?;
    path.push("calendar.ics");
    write(&path, calendar.to_ics())?;
    info!(postal_code = %args.postal_code, path = %path.display(), dates = dates.len(), "wrote calendar");
    Ok(())
}
