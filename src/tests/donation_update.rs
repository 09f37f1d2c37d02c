use axum::http::StatusCode;
use chrono::Duration;
use chrono::Utc;
use serde_json::json;

use crate::tests::helper;

#[tokio::test]
async fn test_update_donation() {
    let (mut app, _) = helper::setup_test_app().await;

    let (donor_token, _) = helper::login_as(&mut app, "donor").await;
    let (other_donor_token, _) = helper::login_as(&mut app, "donor").await;
    let (volunteer_token, _) = helper::login_as(&mut app, "volunteer").await;

    let payload = helper::donation_payload(Duration::hours(2), Duration::days(3));
    let donation = helper::create_donation(&mut app, &donor_token, &payload).await;

    let edit = json!({ "title": "  Tomato soup " });

    let (status_code, _, error) =
        helper::maybe_update_donation(&mut app, &other_donor_token, &donation.id, &edit).await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);
    assert_eq!("Only the donor can change this donation", error.unwrap().error);

    let (status_code, _, _) =
        helper::maybe_update_donation(&mut app, &volunteer_token, &donation.id, &edit).await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);

    let (status_code, updated, _) =
        helper::maybe_update_donation(&mut app, &donor_token, &donation.id, &edit).await;
    assert_eq!(StatusCode::OK, status_code);
    let updated = updated.unwrap();
    assert_eq!("Tomato soup", updated.title);
    assert_eq!("available", updated.status);

    // moving the expiry date before the pickup date
    let edit = json!({ "expiryDate": Utc::now() + Duration::hours(1) });
    let (status_code, _, error) =
        helper::maybe_update_donation(&mut app, &donor_token, &donation.id, &edit).await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(
        Some("Expiry date must be after the pickup date".to_string()),
        error.unwrap().message
    );

    // a reserved donation can still be edited, the reservation stays
    helper::maybe_reserve(&mut app, &volunteer_token, &donation.id, None).await;

    let edit = json!({ "description": "Now with extra bread" });
    let (status_code, updated, _) =
        helper::maybe_update_donation(&mut app, &donor_token, &donation.id, &edit).await;
    assert_eq!(StatusCode::OK, status_code);
    let updated = updated.unwrap();
    assert_eq!("reserved", updated.status);
    assert!(updated.reserved_by.is_some());

    // but not once it is picked up
    helper::maybe_pickup(&mut app, &volunteer_token, &donation.id).await;

    let (status_code, _, error) =
        helper::maybe_update_donation(&mut app, &donor_token, &donation.id, &edit).await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(
        "Donation is picked-up and can not be changed",
        error.unwrap().error
    );
}

#[tokio::test]
async fn test_withdraw_donation() {
    let (mut app, _) = helper::setup_test_app().await;

    let (donor_token, _) = helper::login_as(&mut app, "donor").await;
    let (volunteer_token, _) = helper::login_as(&mut app, "volunteer").await;

    let payload = helper::donation_payload(Duration::hours(2), Duration::days(3));
    let donation = helper::create_donation(&mut app, &donor_token, &payload).await;

    let (status_code, _, error) = helper::maybe_update_donation(
        &mut app,
        &donor_token,
        &donation.id,
        &json!({ "status": "picked-up" }),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Validation error", error.unwrap().error);

    let (status_code, withdrawn, _) = helper::maybe_update_donation(
        &mut app,
        &donor_token,
        &donation.id,
        &json!({ "status": "cancelled" }),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!("cancelled", withdrawn.unwrap().status);

    let (status_code, _, error) =
        helper::maybe_reserve(&mut app, &volunteer_token, &donation.id, None).await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Donation is not available", error.unwrap().error);

    // no longer listed
    let (_, list, _) = helper::list_donations(&mut app, "").await;
    assert!(list.unwrap().donations.iter().all(|listed| listed.id != donation.id));
}

#[tokio::test]
async fn test_delete_donation() {
    let (mut app, _) = helper::setup_test_app().await;

    let (donor_token, _) = helper::login_as(&mut app, "donor").await;
    let (other_donor_token, _) = helper::login_as(&mut app, "donor").await;
    let (volunteer_token, _) = helper::login_as(&mut app, "volunteer").await;

    let payload = helper::donation_payload(Duration::hours(2), Duration::days(3));
    let donation = helper::create_donation(&mut app, &donor_token, &payload).await;

    let (status_code, error) =
        helper::maybe_delete_donation(&mut app, &other_donor_token, &donation.id).await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);
    assert_eq!("Only the donor can change this donation", error.unwrap().error);

    helper::maybe_reserve(&mut app, &volunteer_token, &donation.id, None).await;

    let (status_code, error) =
        helper::maybe_delete_donation(&mut app, &donor_token, &donation.id).await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(
        "Donation is reserved and can not be changed",
        error.unwrap().error
    );

    // the failed delete left it untouched
    let (status_code, stored, _) =
        helper::single_donation(&mut app, &donation.id.to_string()).await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!("reserved", stored.unwrap().status);

    helper::maybe_cancel_reservation(&mut app, &volunteer_token, &donation.id).await;

    let (status_code, error) =
        helper::maybe_delete_donation(&mut app, &donor_token, &donation.id).await;
    assert_eq!(StatusCode::OK, status_code);
    assert!(error.is_none());

    let (status_code, _, _) = helper::single_donation(&mut app, &donation.id.to_string()).await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);

    let (status_code, _) =
        helper::maybe_delete_donation(&mut app, &donor_token, &donation.id).await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);
}
