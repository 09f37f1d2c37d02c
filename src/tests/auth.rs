use axum::http::StatusCode;

use crate::tests::helper;

#[tokio::test]
async fn test_register_and_login() {
    let (mut app, _) = helper::setup_test_app().await;

    let (status_code, user, _) =
        helper::maybe_register(&mut app, " Bakery@Example.com ", "verysecret", "donor").await;
    assert_eq!(StatusCode::CREATED, status_code);
    let user = user.unwrap();
    assert_eq!("bakery@example.com", user.email);
    assert_eq!("donor", user.role);

    // same email, other spelling
    let (status_code, _, error) =
        helper::maybe_register(&mut app, "BAKERY@example.com", "verysecret", "charity").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("User already exists", error.unwrap().error);

    let (status_code, access_token, _) =
        helper::maybe_login(&mut app, "bakery@example.com", "verysecret").await;
    assert_eq!(StatusCode::OK, status_code);
    let access_token = access_token.unwrap();

    let (status_code, current_user) = helper::current_user(&mut app, &access_token).await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!(user.id, current_user.unwrap().id);

    let (status_code, _, error) =
        helper::maybe_login(&mut app, "bakery@example.com", "not the password").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid email or password", error.unwrap().error);

    let (status_code, _, _) =
        helper::maybe_login(&mut app, "nobody@example.com", "verysecret").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
}

#[tokio::test]
async fn test_register_rules() {
    let (mut app, _) = helper::setup_test_app().await;

    let (status_code, _, error) =
        helper::maybe_register(&mut app, "boss@example.com", "verysecret", "admin").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(
        "Role can not be picked when registering",
        error.unwrap().error
    );

    // not a role at all
    let (status_code, _, error) =
        helper::maybe_register(&mut app, "boss@example.com", "verysecret", "manager").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Data error", error.unwrap().error);

    let (status_code, _, error) =
        helper::maybe_register(&mut app, "boss@example.com", "short", "volunteer").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(
        "Password must be at least 8 characters",
        error.unwrap().error
    );

    let (status_code, _, error) =
        helper::maybe_register(&mut app, "no-at-sign", "verysecret", "volunteer").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid email address", error.unwrap().error);
}

#[tokio::test]
async fn test_users_are_listed_for_admins_only() {
    let (mut app, database) = helper::setup_test_app().await;

    let (donor_token, donor) = helper::login_as(&mut app, "donor").await;
    let admin_token = helper::login_as_admin(&mut app, &database).await;

    let (status_code, users) = helper::list_users(&mut app, &donor_token).await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);
    assert!(users.is_none());

    let (status_code, users) = helper::list_users(&mut app, &admin_token).await;
    assert_eq!(StatusCode::OK, status_code);
    let users = users.unwrap();
    assert!(users.iter().any(|user| user.id == donor.id));
    assert!(users.iter().any(|user| user.role == "admin"));
}

#[tokio::test]
async fn test_invalid_tokens() {
    let (mut app, _) = helper::setup_test_app().await;

    let (status_code, _) = helper::current_user(&mut app, "Bearer not-a-token").await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);

    let (status_code, _) = helper::current_user(&mut app, "Basic dXNlcjpwYXNz").await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);

    // creating a donation needs a token
    let payload = helper::donation_payload(chrono::Duration::hours(1), chrono::Duration::days(2));
    let (status_code, _, error) = helper::maybe_create_donation(&mut app, "", &payload).await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);
    assert_eq!("Missing API token", error.unwrap().error);
}
