use chain::NetworkParams;

/// Source of the hosts the peer group falls back to when it knows no better.
pub trait SeedSource: Send + Sync {
    fn to_hosts(&self) -> Vec<String>;
}

impl SeedSource for Vec<String> {
    fn to_hosts(&self) -> Vec<String> {
        self.clone()
    }
}

impl SeedSource for NetworkParams {
    fn to_hosts(&self) -> Vec<String> {
        self.seed_hosts.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticSeeds(Vec<String>);

impl StaticSeeds {
    pub fn new<T: Into<Vec<String>>>(hosts: T) -> Self {
        StaticSeeds(hosts.into())
    }
}

impl SeedSource for StaticSeeds {
    fn to_hosts(&self) -> Vec<String> {
        self.0.clone()
    }
}
