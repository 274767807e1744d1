//! End-to-end operation scenarios over real sockets.

use hotel_protocol::codes;
use hotel_ranking::hotel_average;
use hotel_server::unix_now;

use crate::harness::TestServer;

#[tokio::test]
async fn test_register_duplicate() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_eq!(client.register("alice", "pw").await, codes::OK);
    assert_eq!(client.register("alice", "pw2").await, codes::register::DUPLICATE);
    assert_eq!(server.ctx.store.user_count(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_login_across_connections() {
    let server = TestServer::start().await;
    let mut first = server.client().await;
    let mut second = server.client().await;

    assert_eq!(first.register("alice", "pw").await, codes::OK);
    assert_eq!(first.login("alice", "wrong").await, codes::login::BAD_PASSWORD);
    assert_eq!(first.login("ghost", "pw").await, codes::login::NO_SUCH_USER);
    assert_eq!(first.login("alice", "pw").await, codes::OK);
    assert_eq!(first.login("alice", "pw").await, codes::login::ALREADY_LOGGED_IN);
    assert_eq!(second.login("alice", "pw").await, codes::login::ALREADY_LOGGED_IN);

    // Dropping the first connection releases the login.
    drop(first);
    let mut released = false;
    for _ in 0..50 {
        if !server.ctx.store.is_active("alice") {
            released = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(released, "login not released after disconnect");
    assert_eq!(second.login("alice", "pw").await, codes::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn test_logout_then_login_again() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_eq!(client.logout("alice").await, codes::logout::NOT_LOGGED_IN);
    client.sign_in("alice").await;
    assert_eq!(client.logout("bob").await, codes::logout::USERNAME_MISMATCH);
    assert_eq!(client.logout("alice").await, codes::OK);
    assert_eq!(client.logout("alice").await, codes::logout::NOT_LOGGED_IN);
    assert_eq!(client.login("alice", "pw").await, codes::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn test_review_requires_login_and_invalidates_average() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_eq!(
        client.insert_review("Hotel Roma 1", "Rome", 4).await,
        codes::review::NOT_AUTHENTICATED
    );

    client.sign_in("alice").await;
    let hotel = server.ctx.store.find_hotel("Hotel Roma 1", "Rome").unwrap();
    assert_eq!(hotel_average(&hotel, unix_now()), 0.0);
    assert!(hotel.cached_average().is_some());

    assert_eq!(client.insert_review("Hotel Roma 1", "Rome", 4).await, codes::OK);
    assert_eq!(hotel.cached_average(), None);
    assert_eq!(hotel_average(&hotel, unix_now()), 4.0);

    assert_eq!(
        client.insert_review("Hotel Roma 1", "Rome", 7).await,
        codes::review::INVALID_SCORES
    );
    assert_eq!(
        client.insert_review("Hotel Roma 1", "Milan", 4).await,
        codes::review::HOTEL_NOT_FOUND
    );
    assert_eq!(hotel.review_count(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_search_hotel_and_city_ranking() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let reply = client.search_hotel("Hotel Milano 1", "Milan").await;
    assert_eq!(reply.code, codes::OK);
    assert!(reply.payload.unwrap().starts_with("Hotel Milano 1 (Milan)"));

    let reply = client.search_hotel("Hotel Milano 1", "Rome").await;
    assert_eq!(reply.code, codes::search::NOT_FOUND);
    assert_eq!(reply.payload, None);

    let reply = client.search_hotels("Rome").await;
    assert_eq!(reply.code, codes::OK);
    let listing = reply.payload.unwrap();
    let cards: Vec<&str> = listing.split("\n\n").collect();
    assert_eq!(cards.len(), 2);
    assert!(cards[0].starts_with("1) Hotel Roma 1 (Rome)"));
    assert!(cards[0].contains("Description: test hotel"));
    assert!(cards[1].starts_with("2) Hotel Roma 2 (Rome)"));

    assert_eq!(client.search_hotels("Atlantis").await.code, codes::search::NOT_FOUND);
    assert_eq!(client.search_hotels("").await.code, codes::search::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn test_badge_progression() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_eq!(
        client.show_badge("alice").await.code,
        codes::badge::NOT_AUTHENTICATED
    );
    client.sign_in("alice").await;
    assert_eq!(client.show_badge("alice").await.payload.as_deref(), Some("Reviewer"));
    assert_eq!(
        client.show_badge("bob").await.code,
        codes::badge::NOT_AUTHENTICATED
    );

    for _ in 0..6 {
        assert_eq!(client.insert_review("Hotel Roma 2", "Rome", 3).await, codes::OK);
    }
    assert_eq!(
        client.show_badge("alice").await.payload.as_deref(),
        Some("Expert Reviewer")
    );

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reviews_all_counted() {
    let server = TestServer::start().await;
    let clients = 8;
    let per_client = 10;

    let mut tasks = Vec::new();
    for i in 0..clients {
        let mut client = server.client().await;
        tasks.push(tokio::spawn(async move {
            client.sign_in(&format!("user{i}")).await;
            for _ in 0..per_client {
                assert_eq!(client.insert_review("Hotel Roma 1", "Rome", 5).await, codes::OK);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let hotel = server.ctx.store.find_hotel("Hotel Roma 1", "Rome").unwrap();
    assert_eq!(hotel.review_count(), clients * per_client);
    let total: u32 = server
        .ctx
        .store
        .snapshot_users()
        .iter()
        .map(|u| u.review_count)
        .sum();
    assert_eq!(total as usize, clients * per_client);

    server.shutdown().await;
}
