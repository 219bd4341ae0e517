//! Shared state handed to every project task of one account

use crate::ledger::Account;
use crate::options::RunOptions;
use crate::tos::TosGate;
use keyflow_cloud::KeyCloud;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The account's ledger entry behind the single ledger lock.
///
/// Every read-check-write sequence on the account runs inside one
/// `lock().await` section.
pub type SharedAccount = Arc<Mutex<Account>>;

#[derive(Clone)]
pub struct AccountContext {
    pub email: String,
    pub cloud: Arc<dyn KeyCloud>,
    pub account: SharedAccount,
    pub tos_gate: Arc<TosGate>,
    pub options: RunOptions,
}

impl AccountContext {
    pub fn dry_run(&self) -> bool {
        self.options.dry_run
    }
}
