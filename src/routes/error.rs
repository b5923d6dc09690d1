use crate::middleware::rate_limit::RateLimitRetryAfter;
use rocket::http::{Header, Status};
use rocket::response::Responder;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, Response, catch};

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub message: String,
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Not found".to_string(),
    })
}

#[catch(422)]
pub fn unprocessable_entity(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Malformed request body".to_string(),
    })
}

/// 429 body carrying the Retry-After hint left behind by the rate limiter
pub struct TooManyRequests {
    retry_after_secs: u64,
}

impl<'r> Responder<'r, 'static> for TooManyRequests {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let body = Json(Error {
            message: "Too many requests".to_string(),
        })
        .respond_to(req)?;

        Response::build_from(body)
            .status(Status::TooManyRequests)
            .header(Header::new("Retry-After", self.retry_after_secs.to_string()))
            .ok()
    }
}

#[catch(429)]
pub fn too_many_requests(req: &Request) -> TooManyRequests {
    let retry_after_secs = req.local_cache(|| None::<RateLimitRetryAfter>).as_ref().map(|r| r.0).unwrap_or(60);

    TooManyRequests { retry_after_secs }
}
