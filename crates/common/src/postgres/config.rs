use deadpool_postgres::{Config, ManagerConfig, PoolConfig, RecyclingMethod};

/// Connection settings for the write-key database
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_pool_size: usize,
}

impl PostgresConfig {
    /// Pool settings. Connections are recycled without a test query since
    /// every lookup is a single short statement.
    pub fn pool_config(&self) -> Config {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.database.clone());
        cfg.user = Some(self.username.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(self.max_pool_size));
        cfg
    }
}
