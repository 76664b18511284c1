use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::product::ProductId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionEventId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    AddToCart,
    Purchase,
    AddToWishlist,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::AddToCart => "add_to_cart",
            Self::Purchase => "purchase",
            Self::AddToWishlist => "add_to_wishlist",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "page_view" => Ok(Self::PageView),
            "add_to_cart" => Ok(Self::AddToCart),
            "purchase" => Ok(Self::Purchase),
            "add_to_wishlist" => Ok(Self::AddToWishlist),
            other => Err(DomainError::UnknownEventType(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Product,
    Category,
    Order,
    Page,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Category => "category",
            Self::Order => "order",
            Self::Page => "page",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "product" => Ok(Self::Product),
            "category" => Ok(Self::Category),
            "order" => Ok(Self::Order),
            "page" => Ok(Self::Page),
            other => Err(DomainError::UnknownResourceType(other.to_string())),
        }
    }
}

/// Append-only record of something a shopper (or an anonymous visitor) did.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub id: InteractionEventId,
    pub user_id: Option<UserId>,
    pub event_type: EventType,
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub metadata: Map<String, Value>,
    pub occurred_at: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn new(
        user_id: Option<UserId>,
        event_type: EventType,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: InteractionEventId(Uuid::new_v4().to_string()),
            user_id,
            event_type,
            resource_id: resource_id.into(),
            resource_type,
            metadata: Map::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn product_view(user_id: Option<UserId>, product_id: &ProductId) -> Self {
        Self::new(user_id, EventType::PageView, ResourceType::Product, product_id.0.clone())
    }

    pub fn add_to_cart(user_id: Option<UserId>, product_id: &ProductId, quantity: u32) -> Self {
        Self::new(user_id, EventType::AddToCart, ResourceType::Product, product_id.0.clone())
            .with_metadata("quantity", quantity)
    }

    pub fn add_to_wishlist(user_id: Option<UserId>, product_id: &ProductId) -> Self {
        Self::new(user_id, EventType::AddToWishlist, ResourceType::Product, product_id.0.clone())
    }

    pub fn purchase(user_id: Option<UserId>, order_id: impl Into<String>) -> Self {
        Self::new(user_id, EventType::Purchase, ResourceType::Order, order_id)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }
}
