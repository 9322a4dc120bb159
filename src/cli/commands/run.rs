//! `vigil run`: tick every configured account until Ctrl-C.

use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::join_all;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::domain::models::Config;

use super::{build_service, open_database};

pub async fn execute(config: &Config) -> Result<()> {
    if config.scheduler.accounts.is_empty() {
        bail!("No accounts configured; set scheduler.accounts in vigil.yaml");
    }
    let pool = open_database(config).await?;
    let service = build_service(config, pool)?;

    let mut ticker = interval(Duration::from_secs(config.scheduler.tick_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        accounts = config.scheduler.accounts.len(),
        tick_interval_secs = config.scheduler.tick_interval_secs,
        "scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // each account holds its own tick lock
                let service = &service;
                let ticks = config
                    .scheduler
                    .accounts
                    .iter()
                    .map(|account_id| async move { (account_id, service.run_tick(account_id).await) });
                for (account_id, outcome) in join_all(ticks).await {
                    match outcome {
                        Ok(true) => {}
                        Ok(false) => warn!(account_id, "tick skipped, lock held elsewhere"),
                        Err(e) => error!(account_id, error = ?e, "tick failed"),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }
    Ok(())
}
