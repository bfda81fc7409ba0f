mod common;

use checkout_service::models::{CustomerInfo, PaymentStatus};
use checkout_service::services::CouponBook;
use checkout_service::storefront::{
    CartItem, CartStore, MemoryCartStorage, PaymentCallback, StorefrontClient,
};
use common::TestApp;
use std::sync::Arc;
use std::time::Duration;

fn cart() -> CartStore {
    CartStore::open(
        Arc::new(MemoryCartStorage::new()),
        Arc::new(CouponBook::builtin()),
    )
}

fn gold(quantity: u32) -> CartItem {
    CartItem {
        id: "gold".into(),
        title: "Gold Match".into(),
        price: 149_900,
        category: "Plan".into(),
        icon: None,
        href: None,
        quantity,
    }
}

fn customer() -> CustomerInfo {
    CustomerInfo {
        name: "Asha Rao".into(),
        email: "asha@example.com".into(),
        phone: "9876543210".into(),
    }
}

#[tokio::test]
async fn multi_quantity_cart_checks_out_through_the_client() {
    let app = TestApp::spawn().await;
    let client = StorefrontClient::new(&app.address, Duration::from_secs(5)).unwrap();
    let cart = cart();
    cart.add(gold(2)).unwrap();
    assert_eq!(cart.state().payable, 299_800);

    let ticket = client.create_order(&cart.state()).await.unwrap();
    assert_eq!(ticket.amount, 299_800);
    assert!(!ticket.free);
    assert_eq!(app.gateway.create_calls(), 1);

    app.gateway.mark_paid(&ticket.id);
    let callback = PaymentCallback {
        order_id: ticket.id.clone(),
        payment_id: Some("pay_qty".to_string()),
        signature: Some(app.sign_payment(&ticket.id, "pay_qty")),
    };
    let receipt = client.confirm(&cart, callback, &customer()).await.unwrap();

    assert_eq!(receipt.total_amount, 299_800);
    assert_eq!(receipt.payment_status, PaymentStatus::Completed);
    assert_eq!(receipt.invoices.successful.len(), 1);
    assert_eq!(receipt.invoices.successful[0].amount, 299_800);
    assert!(cart.state().is_empty());
}

#[tokio::test]
async fn multi_quantity_cart_with_coupon_matches_server_price() {
    let app = TestApp::spawn().await;
    let client = StorefrontClient::new(&app.address, Duration::from_secs(5)).unwrap();
    let cart = cart();
    cart.add(gold(3)).unwrap();
    cart.apply_coupon("FIRSTDATE20").unwrap();

    // 20% off 4,497.00
    let ticket = client.create_order(&cart.state()).await.unwrap();
    assert_eq!(ticket.amount, 359_760);
    assert_eq!(ticket.amount, cart.state().payable);
}
