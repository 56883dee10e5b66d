use serde::{Deserialize, Serialize};

use crate::config::RestaurantConfig;
use crate::domain::reservation::OpeningHours;

/// Who is answering the phone. Fed into prompt templates and canned call responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantProfile {
    pub name: String,
    pub agent_name: String,
    pub cuisine: String,
    pub address: String,
    pub phone: String,
    pub hours: OpeningHours,
}

impl Default for RestaurantProfile {
    fn default() -> Self {
        Self {
            name: "Taste of India".to_string(),
            agent_name: "Priya".to_string(),
            cuisine: "Modern Indian Cuisine".to_string(),
            address: "123 Culinary Street, Foodville".to_string(),
            phone: "(555) 123-4567".to_string(),
            hours: OpeningHours::default(),
        }
    }
}

impl From<&RestaurantConfig> for RestaurantProfile {
    fn from(config: &RestaurantConfig) -> Self {
        Self {
            name: config.name.clone(),
            agent_name: config.agent_name.clone(),
            cuisine: config.cuisine.clone(),
            address: config.address.clone(),
            phone: config.phone.clone(),
            hours: OpeningHours { open_hour: config.open_hour, close_hour: config.close_hour },
        }
    }
}
