use {
    crate::order_log::{FileOrderLog, NullOrderLog, OrderLog},
    clap::Parser,
    std::{path::PathBuf, sync::Arc},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Mock app store order endpoint", long_about = None)]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(long, env = "APPMALL_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// JSON file holding the application catalog
    #[arg(long, env = "APPMALL_CATALOG", default_value = "config/apps.json")]
    pub catalog: PathBuf,

    /// File every order request is appended to
    #[arg(long, env = "APPMALL_ORDER_LOG", default_value = "logs/orders.log")]
    pub order_log: PathBuf,

    /// Do not write the order log at all, whatever --order-log says
    #[arg(long)]
    pub no_order_log: bool,
}

impl Config {
    pub fn order_log(&self) -> Arc<dyn OrderLog> {
        if self.no_order_log {
            Arc::new(NullOrderLog)
        } else {
            Arc::new(FileOrderLog::new(&self.order_log))
        }
    }
}
