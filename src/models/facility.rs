use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub start_hour: u32,
    pub end_hour: u32,
    pub slots_per_hour: u32,
}

impl Facility {
    pub fn operating_minutes(&self) -> i64 {
        (i64::from(self.end_hour) - i64::from(self.start_hour)).max(0) * 60
    }
}
