//! Operation handlers: one decoded request in, one result code (plus payload
//! and session effect) out.

use std::fmt::Write as _;
use std::sync::Arc;

use hotel_protocol::{codes, Reply, Request, Scores};
use hotel_ranking::{hotel_average, CityRanking};
use hotel_storage::{Hotel, ReviewError, User};

use crate::session::{Effect, Session};
use crate::{unix_now, ServerContext};

/// Handler result. `reply: None` means close the connection without replying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub reply: Option<Reply>,
    pub effect: Effect,
}

impl Outcome {
    fn reply(reply: Reply) -> Self {
        Self {
            reply: Some(reply),
            effect: Effect::Keep,
        }
    }

    fn code(code: i32) -> Self {
        Self::reply(Reply::code(code))
    }

    fn with_effect(reply: Reply, effect: Effect) -> Self {
        Self {
            reply: Some(reply),
            effect,
        }
    }

    fn close() -> Self {
        Self {
            reply: None,
            effect: Effect::Keep,
        }
    }
}

pub async fn handle(ctx: &ServerContext, session: &Session, request: Request) -> Outcome {
    match request {
        Request::Register { username, password } => register(ctx, username, password).await,
        Request::Login { username, password } => login(ctx, session, username, password).await,
        Request::Logout { username } => logout(ctx, session, &username),
        Request::SearchHotel { name, city } => search_hotel(ctx, &name, &city),
        Request::SearchHotels { city } => search_hotels(ctx, &city),
        Request::InsertReview {
            hotel_name,
            city,
            scores,
        } => insert_review(ctx, session, &hotel_name, &city, scores),
        Request::ShowBadge { username } => show_badge(ctx, session, &username),
        Request::CloseConnection => close_connection(session),
    }
}

async fn register(ctx: &ServerContext, username: String, password: String) -> Outcome {
    if ctx.store.user(&username).is_some() {
        return Outcome::code(codes::register::DUPLICATE);
    }

    let hasher = Arc::clone(&ctx.hasher);
    let digest = match tokio::task::spawn_blocking(move || hasher.hash(&password)).await {
        Ok(Ok(digest)) => digest,
        Ok(Err(e)) => {
            tracing::error!(%username, "password hashing failed: {e}");
            return Outcome::code(codes::register::SERVER_ERROR);
        }
        Err(e) => {
            tracing::error!(%username, "hashing task failed: {e}");
            return Outcome::code(codes::register::SERVER_ERROR);
        }
    };

    if !ctx.store.register_user(User::new(username.clone(), digest)) {
        return Outcome::code(codes::register::DUPLICATE);
    }
    tracing::info!(%username, "user registered");
    Outcome::reply(Reply::ok())
}

async fn login(
    ctx: &ServerContext,
    session: &Session,
    username: String,
    password: String,
) -> Outcome {
    if session.is_authenticated() {
        return Outcome::code(codes::login::ALREADY_LOGGED_IN);
    }
    let Some(digest) = ctx.store.password_digest(&username) else {
        return Outcome::code(codes::login::NO_SUCH_USER);
    };

    let hasher = Arc::clone(&ctx.hasher);
    let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &digest)).await;
    match verified {
        Ok(true) => {}
        Ok(false) => return Outcome::code(codes::login::BAD_PASSWORD),
        Err(e) => {
            tracing::error!(%username, "verification task failed: {e}");
            return Outcome::code(codes::login::SERVER_ERROR);
        }
    }

    if !ctx.store.try_activate(&username) {
        tracing::debug!(%username, "login refused, already logged in elsewhere");
        return Outcome::code(codes::login::ALREADY_LOGGED_IN);
    }
    tracing::info!(%username, "user logged in");
    Outcome::with_effect(Reply::ok(), Effect::Authenticate(username))
}

fn logout(ctx: &ServerContext, session: &Session, username: &str) -> Outcome {
    if !session.is_authenticated() {
        return Outcome::code(codes::logout::NOT_LOGGED_IN);
    }
    if !session.is(username) {
        return Outcome::code(codes::logout::USERNAME_MISMATCH);
    }
    ctx.store.deactivate(username);
    tracing::info!(%username, "user logged out");
    Outcome::with_effect(Reply::ok(), Effect::Clear)
}

fn search_hotel(ctx: &ServerContext, name: &str, city: &str) -> Outcome {
    match ctx.store.find_hotel(name, city) {
        Some(hotel) => {
            let average = hotel_average(&hotel, unix_now());
            Outcome::reply(Reply::ok_with(describe_hotel(&hotel, average)))
        }
        None => Outcome::code(codes::search::NOT_FOUND),
    }
}

fn search_hotels(ctx: &ServerContext, city: &str) -> Outcome {
    match ctx.rankings.ranking(city) {
        Some(ranking) if !ranking.is_empty() => {
            Outcome::reply(Reply::ok_with(describe_ranking(&ranking)))
        }
        _ => Outcome::code(codes::search::NOT_FOUND),
    }
}

fn insert_review(
    ctx: &ServerContext,
    session: &Session,
    hotel_name: &str,
    city: &str,
    scores: Scores,
) -> Outcome {
    let Some(username) = session.username() else {
        return Outcome::code(codes::review::NOT_AUTHENTICATED);
    };

    match ctx
        .store
        .add_review(username, hotel_name, city, scores.as_array(), unix_now())
    {
        Ok(review) => {
            tracing::debug!(%username, hotel = hotel_name, %city, review_id = review.id, "review stored");
            Outcome::reply(Reply::ok())
        }
        Err(ReviewError::InvalidScores) => Outcome::code(codes::review::INVALID_SCORES),
        Err(ReviewError::HotelNotFound) => Outcome::code(codes::review::HOTEL_NOT_FOUND),
        Err(ReviewError::UnknownUser) => {
            tracing::warn!(%username, "session user missing from store");
            Outcome::code(codes::review::NOT_AUTHENTICATED)
        }
    }
}

fn show_badge(ctx: &ServerContext, session: &Session, username: &str) -> Outcome {
    if !session.is(username) {
        return Outcome::code(codes::badge::NOT_AUTHENTICATED);
    }
    match ctx.store.badge(username) {
        Some(badge) => Outcome::reply(Reply::ok_with(badge.as_str())),
        None => Outcome::code(codes::badge::NOT_AUTHENTICATED),
    }
}

fn close_connection(session: &Session) -> Outcome {
    if session.is_authenticated() {
        return Outcome::code(codes::close::STILL_AUTHENTICATED);
    }
    Outcome::close()
}

/// Human-readable hotel card returned by searchHotel.
pub fn describe_hotel(hotel: &Hotel, average: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", hotel.name, hotel.city);
    let _ = writeln!(
        out,
        "Weighted average: {average:.2} over {} reviews",
        hotel.review_count()
    );
    if !hotel.description.is_empty() {
        let _ = writeln!(out, "Description: {}", hotel.description);
    }
    if !hotel.phone.is_empty() {
        let _ = writeln!(out, "Phone: {}", hotel.phone);
    }
    if !hotel.services.is_empty() {
        let _ = writeln!(out, "Services: {}", hotel.services.join(", "));
    }
    for review in hotel.reviews() {
        let _ = writeln!(out, "  - {review}");
    }
    out
}

/// Ordered city listing returned by searchHotels: one numbered hotel card per
/// ranked hotel, separated by blank lines.
pub fn describe_ranking(ranking: &CityRanking) -> String {
    let mut out = String::new();
    for (position, entry) in ranking.iter().enumerate() {
        if position > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{}) {}", position + 1, describe_hotel(&entry.hotel, entry.average));
    }
    out
}
