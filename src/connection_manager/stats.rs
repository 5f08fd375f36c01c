//! Registry and group statistics

use serde::Serialize;
use std::collections::HashMap;

/// Connection registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub online_users: usize,
}

/// Topic group statistics
#[derive(Debug, Clone, Serialize)]
pub struct GroupStats {
    pub total_groups: usize,
    pub members: HashMap<String, usize>,
}
