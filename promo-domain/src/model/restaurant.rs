use crate::value_object::RestaurantId;
use bon::Builder;
use serde::{Deserialize, Serialize};

/// 餐厅（投递核心只读）
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct Restaurant {
    id: RestaurantId,
    #[builder(into)]
    name: String,
    #[builder(into)]
    address: Option<String>,
    #[builder(into)]
    phone: Option<String>,
    #[builder(into)]
    email: Option<String>,
    #[builder(into)]
    website: Option<String>,
}

impl Restaurant {
    pub fn id(&self) -> RestaurantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn website(&self) -> Option<&str> {
        self.website.as_deref()
    }
}
