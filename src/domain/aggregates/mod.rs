//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod loyalty;

pub use product::{ProductError, ProductInput, ProductRequest, DEFAULT_LOW_STOCK_THRESHOLD};
pub use order::{next_order_number, AddressSnapshot, CustomerSnapshot, NewOrder, NewOrderItem, OrderUpdate, Reconciliation, Transition};
pub use cart::{Cart, CartError, CartItem, CartStore, MemoryCartStore, DEFAULT_CART_CAPACITY, DEFAULT_CART_TTL, MAX_LINE_QUANTITY};
pub use loyalty::{next_reward_threshold, reward_code, NewLoyaltyTransaction};
