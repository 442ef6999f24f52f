//! Checkout: turns a submitted cart into a persisted order and, when a payment
//! provider is configured, a hosted payment session.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{next_order_number, AddressSnapshot, CustomerSnapshot, NewOrder, NewOrderItem, MAX_LINE_QUANTITY};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::pricing::{loyalty_points_for, Totals, MAX_STORED_AMOUNT};
use crate::domain::value_objects::minor_units;
use crate::model::{Order, Product, Profile, Role};
use crate::payments::{CheckoutSessionRequest, SessionLine};
use crate::{AppConfig, AppState, Result, StorefrontError};

pub const BANK_TRANSFER_MESSAGE: &str = "Order created (payment by bank transfer)";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: Uuid,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub product_sku: Option<String>,
    pub quantity: i32,
    /// Client-side unit price; compared against the catalog, never persisted.
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    pub customer: CustomerInfo,
    pub shipping_address: AddressSnapshot,
    /// Defaults to the shipping address.
    #[serde(default)]
    pub billing_address: Option<AddressSnapshot>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    #[serde(default)]
    pub tax: Option<Decimal>,
    #[serde(default)]
    pub shipping_cost: Option<Decimal>,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub is_guest: bool,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub order_id: Uuid,
    pub order_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Registered orders belong to the authenticated caller. A signed-in caller who
/// asks for a guest checkout without naming a `userId` gets a guest order.
fn resolve_customer<'a>(caller: Option<&'a Profile>, request: &CheckoutRequest) -> Result<Option<&'a Profile>> {
    match (caller, request.user_id) {
        (Some(profile), Some(claimed)) if claimed != profile.id => Err(StorefrontError::Forbidden),
        (None, Some(_)) if !request.is_guest => Err(StorefrontError::Unauthorized),
        (Some(_), None) if request.is_guest => Ok(None),
        (caller, _) => Ok(caller),
    }
}

fn quantity_too_large() -> StorefrontError {
    StorefrontError::Validation(format!("Quantity may not exceed {MAX_LINE_QUANTITY} per product"))
}

/// Prices every line from the live catalog. Repeated products merge into one line.
fn price_lines(request: &CheckoutRequest, catalog: &HashMap<Uuid, Product>) -> Result<Vec<NewOrderItem>> {
    let mut items: Vec<NewOrderItem> = Vec::with_capacity(request.items.len());
    for line in &request.items {
        let product = catalog
            .get(&line.product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| StorefrontError::Validation(format!("Product {} is not available", line.product_id)))?;
        if let Some(submitted) = line.price.filter(|p| *p != product.price) {
            tracing::warn!(product_id = %product.id, %submitted, catalog = %product.price, "submitted price differs from catalog");
        }
        match items.iter_mut().find(|i| i.product_id == product.id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .filter(|q| u32::try_from(*q).is_ok_and(|q| q <= MAX_LINE_QUANTITY))
                    .ok_or_else(quantity_too_large)?;
            }
            None => items.push(NewOrderItem {
                product_id: product.id,
                product_name: product.name.clone(),
                product_sku: product.sku.clone(),
                quantity: line.quantity,
                price: product.price,
            }),
        }
    }
    Ok(items)
}

fn warn_on_total_mismatch(request: &CheckoutRequest, totals: &Totals) {
    let submitted = [
        ("subtotal", request.subtotal, totals.subtotal),
        ("tax", request.tax, totals.tax),
        ("shipping_cost", request.shipping_cost, totals.shipping_cost),
        ("total", request.total, totals.total),
    ];
    for (field, claimed, computed) in submitted {
        if let Some(claimed) = claimed.filter(|c| *c != computed) {
            tracing::warn!(field, %claimed, %computed, "submitted totals differ from catalog pricing; using catalog pricing");
        }
    }
}

/// Hosted checkout lines: one per item, then shipping and tax as their own lines.
pub fn session_request(config: &AppConfig, order: &Order, items: &[NewOrderItem]) -> CheckoutSessionRequest {
    let mut lines: Vec<SessionLine> = items
        .iter()
        .map(|i| SessionLine { name: i.product_name.clone(), unit_amount: minor_units(i.price), quantity: i64::from(i.quantity) })
        .collect();
    if order.shipping_cost > Decimal::ZERO {
        lines.push(SessionLine { name: "Shipping".into(), unit_amount: minor_units(order.shipping_cost), quantity: 1 });
    }
    if order.tax > Decimal::ZERO {
        lines.push(SessionLine { name: "VAT (21%)".into(), unit_amount: minor_units(order.tax), quantity: 1 });
    }
    CheckoutSessionRequest {
        order_id: order.id,
        order_number: order.order_number.clone(),
        customer_email: order.customer_email.clone(),
        currency: config.currency.clone(),
        lines,
        success_url: format!("{}/checkout/success?order={}&session_id={{CHECKOUT_SESSION_ID}}", config.app_url, order.order_number),
        cancel_url: format!("{}/checkout", config.app_url),
    }
}

#[tracing::instrument(skip_all, fields(user_id = ?caller.map(|p| p.id), lines = request.items.len()))]
pub async fn place_order(state: &AppState, caller: Option<&Profile>, request: CheckoutRequest) -> Result<CheckoutResponse> {
    if request.items.is_empty() {
        return Err(StorefrontError::Validation("No products in order".into()));
    }
    if request.items.iter().any(|i| i.quantity <= 0) {
        return Err(StorefrontError::Validation("Quantity must be at least 1".into()));
    }
    if request.items.iter().any(|i| i.quantity.unsigned_abs() > MAX_LINE_QUANTITY) {
        return Err(quantity_too_large());
    }
    request.customer.validate()?;
    request.shipping_address.validate()?;
    if let Some(billing) = &request.billing_address { billing.validate()?; }

    let customer = resolve_customer(caller, &request)?;

    let mut ids: Vec<Uuid> = request.items.iter().map(|i| i.product_id).collect();
    ids.sort_unstable();
    ids.dedup();
    let catalog: HashMap<Uuid, Product> = state.store.products_by_ids(&ids).await?.into_iter().map(|p| (p.id, p)).collect();
    let items = price_lines(&request, &catalog)?;

    let subtotal: Decimal = items.iter().map(NewOrderItem::total).sum();
    let totals = Totals::with_standard_shipping(subtotal);
    if totals.total > MAX_STORED_AMOUNT {
        return Err(StorefrontError::Validation(format!("Order total may not exceed {MAX_STORED_AMOUNT}")));
    }
    warn_on_total_mismatch(&request, &totals);

    let shipping = request.shipping_address.clone();
    let new_order = NewOrder {
        id: Uuid::new_v4(),
        order_number: next_order_number(),
        user_id: customer.map(|p| p.id),
        guest_email: customer.is_none().then(|| request.customer.email.clone()),
        customer: CustomerSnapshot {
            email: request.customer.email.clone(),
            first_name: request.customer.first_name.clone(),
            last_name: request.customer.last_name.clone(),
            phone: request.customer.phone.clone(),
        },
        billing: request.billing_address.clone().unwrap_or_else(|| shipping.clone()),
        shipping,
        totals,
        loyalty_points_earned: customer.map_or(0, |_| loyalty_points_for(subtotal)),
        notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
        is_b2b: customer.is_some_and(|p| p.role == Role::B2b),
        items: items.clone(),
    };

    let order = state.store.place_order(new_order).await?;
    tracing::info!(order_id = %order.id, order_number = %order.order_number, total = %order.total, "order placed");

    let mut response = CheckoutResponse {
        success: true,
        order_id: order.id,
        order_number: order.order_number.clone(),
        checkout_url: None,
        message: None,
    };

    if let Some(provider) = &state.payments {
        match provider.create_checkout_session(&session_request(&state.config, &order, &items)).await {
            Ok(session) => {
                // The webhook finds the order through session metadata, so a lost session id is recoverable.
                if let Err(e) = state.store.attach_payment_session(order.id, &session.id).await {
                    tracing::error!(order_id = %order.id, error = %e, "failed to store payment session id");
                }
                response.checkout_url = session.url;
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "payment session creation failed; order left pending");
                response.message = Some(BANK_TRANSFER_MESSAGE.into());
            }
        }
    }

    state.events.publish(DomainEvent::Order(OrderEvent::Created {
        order_id: order.id,
        order_number: order.order_number.clone(),
        user_id: order.user_id,
        total: order.total,
    })).await;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn request(value: serde_json::Value) -> CheckoutRequest { serde_json::from_value(value).unwrap() }

    fn base(user_id: Option<Uuid>, is_guest: bool) -> CheckoutRequest {
        request(json!({
            "items": [{ "productId": Uuid::new_v4(), "quantity": 1 }],
            "customer": { "email": "a@b.nl", "firstName": "A", "lastName": "B" },
            "shippingAddress": { "street": "Main", "postalCode": "1000AA", "city": "Amsterdam", "country": "NL" },
            "isGuest": is_guest,
            "userId": user_id,
        }))
    }

    fn profile(role: Role) -> Profile {
        Profile {
            id: Uuid::new_v4(), email: "p@b.nl".into(), role, first_name: None, last_name: None, phone: None,
            company_name: None, vat_number: None, b2b_price_list_id: None, loyalty_points: 0,
            created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_request_accepts_client_shape() {
        let r = request(json!({
            "items": [{ "productId": Uuid::nil(), "productName": "Oil", "productSku": "OIL-1", "quantity": 2, "price": 10.0 }],
            "customer": { "email": "a@b.nl", "firstName": "A", "lastName": "B", "phone": "0612345678" },
            "shippingAddress": { "street": "Main", "houseNumber": "1", "postalCode": "1000AA", "city": "Amsterdam", "country": "NL" },
            "billingAddress": { "street": "Main", "houseNumber": "1", "postalCode": "1000AA", "city": "Amsterdam", "country": "NL" },
            "notes": "", "subtotal": 20.0, "tax": 4.2, "shippingCost": 4.95, "total": 29.15, "isGuest": true, "userId": null
        }));
        assert_eq!(r.items[0].quantity, 2);
        assert_eq!(r.shipping_cost, Some(Decimal::new(495, 2)));
        assert!(r.is_guest);
    }

    #[test]
    fn test_resolve_customer() {
        let me = profile(Role::Consumer);
        assert!(resolve_customer(None, &base(None, true)).unwrap().is_none());
        assert_eq!(resolve_customer(Some(&me), &base(Some(me.id), false)).unwrap().unwrap().id, me.id);
        assert!(matches!(resolve_customer(Some(&me), &base(Some(Uuid::new_v4()), false)), Err(StorefrontError::Forbidden)));
        assert!(matches!(resolve_customer(None, &base(Some(Uuid::new_v4()), false)), Err(StorefrontError::Unauthorized)));
        assert_eq!(resolve_customer(Some(&me), &base(None, false)).unwrap().unwrap().id, me.id);
    }

    #[test]
    fn test_signed_in_guest_checkout_stays_guest() {
        let me = profile(Role::Consumer);
        assert!(resolve_customer(Some(&me), &base(None, true)).unwrap().is_none());
        // naming yourself wins over the guest flag
        assert_eq!(resolve_customer(Some(&me), &base(Some(me.id), true)).unwrap().unwrap().id, me.id);
    }

    #[test]
    fn test_repeated_lines_merge_under_the_cap() {
        let product = Product {
            id: Uuid::new_v4(), slug: "oil".into(), name: "Oil".into(), description: None, short_description: None,
            price: Decimal::new(500, 2), compare_at_price: None, cost_price: None, sku: None, barcode: None,
            stock_quantity: 100_000, low_stock_threshold: 5, category_id: None, is_active: true, is_featured: false,
            weight: None, meta_title: None, meta_description: None, images: vec![], created_at: Utc::now(), updated_at: Utc::now(),
        };
        let catalog = HashMap::from([(product.id, product.clone())]);
        let lines = |a: i32, b: i32| request(json!({
            "items": [{ "productId": product.id, "quantity": a }, { "productId": product.id, "quantity": b }],
            "customer": { "email": "a@b.nl", "firstName": "A", "lastName": "B" },
            "shippingAddress": { "street": "Main", "postalCode": "1000AA", "city": "Amsterdam", "country": "NL" },
        }));

        let items = price_lines(&lines(2, 3), &catalog).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 5);

        assert!(matches!(price_lines(&lines(6_000, 6_000), &catalog), Err(StorefrontError::Validation(_))));
        assert!(matches!(price_lines(&lines(i32::MAX, i32::MAX), &catalog), Err(StorefrontError::Validation(_))));
    }

    #[test]
    fn test_session_request_lines() {
        let config = AppConfig::local("secret");
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(), order_number: "ORD-00000042".into(), user_id: None, guest_email: Some("a@b.nl".into()),
            status: Default::default(), payment_status: Default::default(),
            customer_email: "a@b.nl".into(), customer_first_name: "A".into(), customer_last_name: "B".into(), customer_phone: None,
            shipping_street: "Main".into(), shipping_house_number: "1".into(), shipping_postal_code: "1000AA".into(), shipping_city: "Amsterdam".into(), shipping_country: "NL".into(),
            billing_street: "Main".into(), billing_house_number: "1".into(), billing_postal_code: "1000AA".into(), billing_city: "Amsterdam".into(), billing_country: "NL".into(),
            subtotal: Decimal::new(3000, 2), tax: Decimal::new(630, 2), shipping_cost: Decimal::new(495, 2), total: Decimal::new(4125, 2),
            loyalty_points_earned: 0, payment_session_id: None, payment_intent_id: None, notes: None, is_b2b: false,
            invoice_number: None, created_at: now, updated_at: now,
        };
        let items = vec![NewOrderItem { product_id: Uuid::new_v4(), product_name: "Oil".into(), product_sku: None, quantity: 3, price: Decimal::new(1000, 2) }];
        let session = session_request(&config, &order, &items);
        assert_eq!(session.lines.len(), 3);
        assert_eq!(session.amount_total(), 4125);
        assert_eq!(session.success_url, "http://localhost:3000/checkout/success?order=ORD-00000042&session_id={CHECKOUT_SESSION_ID}");
        assert_eq!(session.cancel_url, "http://localhost:3000/checkout");
    }
}
