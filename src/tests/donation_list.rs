use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;

use crate::tests::helper;

const EMPIRE_STATE: (f64, f64) = (-73.9857, 40.7484);
const TIMES_SQUARE: (f64, f64) = (-73.9855, 40.7580);
const PHILADELPHIA: (f64, f64) = (-75.1652, 39.9526);

#[tokio::test]
async fn test_nearby_donations() {
    let (mut app, database) = helper::setup_test_app().await;

    let (donor_token, donor) = helper::login_as(&mut app, "donor").await;

    let (longitude, latitude) = TIMES_SQUARE;
    let payload =
        helper::donation_payload_at(longitude, latitude, Duration::hours(2), Duration::days(3));
    let times_square = helper::create_donation(&mut app, &donor_token, &payload).await;

    let (longitude, latitude) = EMPIRE_STATE;
    let payload =
        helper::donation_payload_at(longitude, latitude, Duration::hours(2), Duration::days(3));
    let empire_state = helper::create_donation(&mut app, &donor_token, &payload).await;

    let (longitude, latitude) = PHILADELPHIA;
    let payload =
        helper::donation_payload_at(longitude, latitude, Duration::hours(2), Duration::days(3));
    let philadelphia = helper::create_donation(&mut app, &donor_token, &payload).await;

    // right next to the others, but expired
    let (longitude, latitude) = EMPIRE_STATE;
    let payload =
        helper::donation_payload_at(longitude, latitude, -Duration::days(2), -Duration::hours(1));
    let expired = helper::insert_donation(&database, &donor.id, payload).await;

    let (longitude, latitude) = EMPIRE_STATE;
    let query = format!("lat={latitude}&lng={longitude}&radius=5");
    let (status_code, list, _) = helper::list_donations(&mut app, &query).await;
    assert_eq!(StatusCode::OK, status_code);
    let list = list.unwrap();
    assert_eq!(2, list.total);
    assert_eq!(
        vec![empire_state.id, times_square.id],
        list.donations.iter().map(|listed| listed.id).collect::<Vec<_>>()
    );
    assert_eq!(Some(0.0), list.donations[0].distance_miles);
    let distance = list.donations[1].distance_miles.unwrap();
    assert!(distance > 0.5 && distance < 0.8, "{distance}");

    // a larger radius includes Philadelphia, still nearest first
    let query = format!("lat={latitude}&lng={longitude}&radius=100");
    let (_, list, _) = helper::list_donations(&mut app, &query).await;
    let list = list.unwrap();
    assert_eq!(
        vec![empire_state.id, times_square.id, philadelphia.id],
        list.donations.iter().map(|listed| listed.id).collect::<Vec<_>>()
    );
    assert!(list.donations.iter().all(|listed| listed.distance_miles.unwrap() <= 100.0));

    // expired ones only show up when asked for
    let query = format!("lat={latitude}&lng={longitude}&radius=5&status=expired");
    let (_, list, _) = helper::list_donations(&mut app, &query).await;
    let list = list.unwrap();
    assert_eq!(1, list.total);
    assert_eq!(expired, list.donations[0].id);
    assert_eq!("expired", list.donations[0].status);
}

#[tokio::test]
async fn test_nearby_query_parameters() {
    let (mut app, _) = helper::setup_test_app().await;

    let (status_code, _, error) = helper::list_donations(&mut app, "lat=40.7").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Both `lat` and `lng` are required", error.unwrap().error);

    let (status_code, _, error) = helper::list_donations(&mut app, "lat=95&lng=0").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid location", error.unwrap().error);

    let (status_code, _, error) =
        helper::list_donations(&mut app, "lat=40.7&lng=-73.9&radius=-1").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(
        "`radius` must be a positive number of miles",
        error.unwrap().error
    );

    let (status_code, _, error) = helper::list_donations(&mut app, "category=candy").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid query parameter", error.unwrap().error);
}

#[tokio::test]
async fn test_list_filters_and_pages() {
    let (mut app, _) = helper::setup_test_app().await;

    let (donor_token, _) = helper::login_as(&mut app, "donor").await;

    let mut bakery = Vec::new();
    for _ in 0..3 {
        let mut payload = helper::donation_payload(Duration::hours(2), Duration::days(3));
        payload["category"] = json!("bakery");
        payload["title"] = json!("Sourdough");
        bakery.push(helper::create_donation(&mut app, &donor_token, &payload).await);
    }

    let payload = helper::donation_payload(Duration::hours(1), Duration::hours(20));
    let urgent = helper::create_donation(&mut app, &donor_token, &payload).await;

    let (_, list, _) = helper::list_donations(&mut app, "").await;
    assert_eq!(4, list.unwrap().total);

    let (_, list, _) = helper::list_donations(&mut app, "category=bakery").await;
    let list = list.unwrap();
    assert_eq!(3, list.total);
    assert!(list.donations.iter().all(|listed| listed.title == "Sourdough"));

    let (_, list, _) = helper::list_donations(&mut app, "urgent=true").await;
    let list = list.unwrap();
    assert_eq!(1, list.total);
    assert_eq!(urgent.id, list.donations[0].id);

    let (_, list, _) = helper::list_donations(&mut app, "sort=expiring&limit=1").await;
    let list = list.unwrap();
    assert_eq!(4, list.total);
    assert_eq!(4, list.pages);
    assert_eq!(urgent.id, list.donations[0].id);

    // pages do not overlap
    let mut seen = Vec::new();
    for page in 1..=2 {
        let (_, list, _) =
            helper::list_donations(&mut app, &format!("category=bakery&limit=2&page={page}"))
                .await;
        seen.extend(list.unwrap().donations.into_iter().map(|listed| listed.id));
    }
    seen.sort();
    let mut expected = bakery.iter().map(|donation| donation.id).collect::<Vec<_>>();
    expected.sort();
    assert_eq!(expected, seen);

    // nothing is reserved
    let (_, list, _) = helper::list_donations(&mut app, "status=reserved").await;
    assert_eq!(0, list.unwrap().total);
}

#[tokio::test]
async fn test_my_donations() {
    let (mut app, database) = helper::setup_test_app().await;

    let (donor_token, _) = helper::login_as(&mut app, "donor").await;
    let (other_donor_token, _) = helper::login_as(&mut app, "donor").await;
    let (volunteer_token, _) = helper::login_as(&mut app, "volunteer").await;

    let payload = helper::donation_payload(Duration::hours(2), Duration::days(3));
    let first = helper::create_donation(&mut app, &donor_token, &payload).await;
    let second = helper::create_donation(&mut app, &donor_token, &payload).await;
    helper::create_donation(&mut app, &other_donor_token, &payload).await;

    helper::maybe_reserve(&mut app, &volunteer_token, &first.id, None).await;

    // donors see their own, in any status
    let (status_code, list, _) = helper::my_donations(&mut app, &donor_token).await;
    assert_eq!(StatusCode::OK, status_code);
    let mut ids = list
        .unwrap()
        .donations
        .iter()
        .map(|listed| listed.id)
        .collect::<Vec<_>>();
    ids.sort();
    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(expected, ids);

    // volunteers see what they reserved
    let (status_code, list, _) = helper::my_donations(&mut app, &volunteer_token).await;
    assert_eq!(StatusCode::OK, status_code);
    let list = list.unwrap();
    assert_eq!(1, list.total);
    assert_eq!(first.id, list.donations[0].id);
    assert_eq!("reserved", list.donations[0].status);

    let admin_token = helper::login_as_admin(&mut app, &database).await;
    let (status_code, _, _) = helper::my_donations(&mut app, &admin_token).await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);
}

#[tokio::test]
async fn test_expiring_soon() {
    let (mut app, database) = helper::setup_test_app().await;

    let (donor_token, donor) = helper::login_as(&mut app, "donor").await;
    let (volunteer_token, _) = helper::login_as(&mut app, "volunteer").await;

    let payload = helper::donation_payload(Duration::hours(1), Duration::hours(30));
    let tomorrow = helper::create_donation(&mut app, &donor_token, &payload).await;

    let payload = helper::donation_payload(Duration::hours(1), Duration::hours(10));
    let tonight = helper::create_donation(&mut app, &donor_token, &payload).await;

    let payload = helper::donation_payload(Duration::hours(1), Duration::days(10));
    helper::create_donation(&mut app, &donor_token, &payload).await;

    let payload = helper::donation_payload(Duration::hours(1), Duration::hours(5));
    let reserved = helper::create_donation(&mut app, &donor_token, &payload).await;
    helper::maybe_reserve(&mut app, &volunteer_token, &reserved.id, None).await;

    let payload = helper::donation_payload(-Duration::days(1), -Duration::hours(1));
    helper::insert_donation(&database, &donor.id, payload).await;

    let (status_code, donations, _) = helper::expiring_soon(&mut app, &donor_token, "2").await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!(
        vec![tonight.id, tomorrow.id],
        donations
            .unwrap()
            .iter()
            .map(|donation| donation.id)
            .collect::<Vec<_>>()
    );

    let (status_code, donations, _) = helper::expiring_soon(&mut app, &donor_token, "0").await;
    assert_eq!(StatusCode::OK, status_code);
    assert!(donations.unwrap().is_empty());

    let (status_code, _, error) = helper::expiring_soon(&mut app, &donor_token, "366").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Days must be at most 365", error.unwrap().error);

    let (status_code, _, error) = helper::expiring_soon(&mut app, &donor_token, "soon").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid path parameter", error.unwrap().error);

    let (status_code, _, _) = helper::expiring_soon(&mut app, "", "2").await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);
}
