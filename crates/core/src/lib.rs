pub mod analytics;
pub mod config;
pub mod domain;
pub mod errors;
pub mod recommendations;

pub use analytics::{InMemoryInteractionLog, InteractionLog, InteractionLogError, InteractionTracker};
pub use domain::interaction::{EventType, InteractionEvent, InteractionEventId, ResourceType};
pub use domain::order::{CartItem, Order, OrderId, OrderItem};
pub use domain::product::{Category, CategoryId, Product, ProductId, SellerId};
pub use domain::user::UserId;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use recommendations::{
    RecommendationEngine, RecommendationSet, RecommendationSettings, RecommendationStore,
    RelevanceScorer, ScoredProduct, SignalSource, StoreError,
};
