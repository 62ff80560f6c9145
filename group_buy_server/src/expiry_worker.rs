use group_buy_engine::{
    order_objects::SweepSummary,
    OrderFlowApi,
    OrderFlowError,
    SettlementApi,
    SqliteDatabase,
    SqliteLockProvider,
};
use log::*;
use tokio::task::JoinHandle;

use crate::config::ExpiryConfig;

pub type WorkerOrderFlowApi = OrderFlowApi<SqliteDatabase, SqliteLockProvider>;

#[derive(Debug, Default)]
pub struct ExpiryReport {
    pub teams: SweepSummary,
    pub unpaid_timed_out: usize,
    /// Completed teams settled by the catch-up settlement sweep
    pub settled_teams: usize,
}

impl ExpiryReport {
    pub fn is_empty(&self) -> bool {
        self.teams.virtually_completed.is_empty() &&
            self.teams.failed.is_empty() &&
            self.teams.refunded == 0 &&
            self.teams.refund_errors == 0 &&
            self.unpaid_timed_out == 0 &&
            self.settled_teams == 0
    }
}

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_expiry_worker(
    api: WorkerOrderFlowApi,
    settlement: SettlementApi<SqliteDatabase>,
    config: ExpiryConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(config.interval);
        info!("🕰️ Team expiry worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running team expiry job");
            match run_expiry_pass(&api, &settlement, &config).await {
                Ok(report) if !report.is_empty() => {
                    let teams = &report.teams;
                    info!(
                        "🕰️ {} teams completed virtually, {} teams failed, {} legs refunded ({} refunds to retry), {} \
                         unpaid legs timed out, {} outstanding teams settled",
                        teams.virtually_completed.len(),
                        teams.failed.len(),
                        teams.refunded,
                        teams.refund_errors,
                        report.unpaid_timed_out,
                        report.settled_teams
                    );
                },
                Ok(_) => {},
                Err(e) => {
                    error!("🕰️ Error running team expiry job: {e}");
                },
            }
        }
    })
}

/// One pass of the expiry job: the team sweep, then the unpaid-leg sweep, then the catch-up settlement of completed
/// teams. A settlement failure is logged and does not fail the pass.
pub async fn run_expiry_pass(
    api: &WorkerOrderFlowApi,
    settlement: &SettlementApi<SqliteDatabase>,
    config: &ExpiryConfig,
) -> Result<ExpiryReport, OrderFlowError> {
    let teams = api.sweep_expired_orders(config.virtual_completion.as_ref(), config.batch_size).await?;
    let unpaid = api.expire_unpaid_trade_orders(config.unpaid_timeout, config.batch_size).await?;
    let settled_teams = match settlement.settle_outstanding_orders(config.batch_size).await {
        Ok(results) => results.len(),
        Err(e) => {
            warn!("🕰️ Settlement sweep failed. It will run again on the next pass. {e}");
            0
        },
    };
    Ok(ExpiryReport { teams, unpaid_timed_out: unpaid.len(), settled_teams })
}
