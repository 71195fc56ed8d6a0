pub mod action;
pub mod bot;
pub mod chat;
pub mod discord;
pub mod generate;
pub mod leaderboard;
pub mod session;
pub mod settings;

#[cfg(test)]
mod testing;

pub use bot::Bot;
pub use discord::Discord;
pub use ed25519_dalek::VerifyingKey;
pub use session::Runner;
pub use settings::Settings;

use ed25519_dalek::{Signature, Verifier};
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Body, Bytes},
    header::{HeaderValue, CONTENT_TYPE},
    Method, Request, Response, StatusCode,
};

/// Verified entry point of the interactions endpoint.
pub struct App {
    bot: Bot,
    key: VerifyingKey,
}

impl App {
    pub fn new(bot: Bot, key: VerifyingKey) -> Self {
        Self { bot, key }
    }

    pub async fn try_respond<B>(&self, request: Request<B>) -> Result<Response<Full<Bytes>>, StatusCode>
    where
        B: Body,
    {
        if request.uri().path() != "/" {
            return Err(StatusCode::NOT_FOUND);
        }
        if request.method() != Method::POST {
            return Err(StatusCode::METHOD_NOT_ALLOWED);
        }

        // Retrieve security headers
        let (parts, body) = request.into_parts();
        let maybe_sig = parts.headers.get("X-Signature-Ed25519");
        let maybe_time = parts.headers.get("X-Signature-Timestamp");
        let (sig, timestamp) = maybe_sig.zip(maybe_time).ok_or(StatusCode::UNAUTHORIZED)?;
        let signature = hex::decode(sig).map_err(|_| StatusCode::BAD_REQUEST)?;
        let signature = Signature::from_slice(&signature).map_err(|_| StatusCode::BAD_REQUEST)?;

        // Append body after the timestamp
        let payload = body.collect().await.map_err(|_| StatusCode::BAD_REQUEST)?.to_bytes();
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(&payload);

        // Validate the challenge
        self.key.verify(&message, &signature).map_err(|_| StatusCode::UNAUTHORIZED)?;
        drop(message);

        let interaction = serde_json::from_slice(&payload).map_err(|err| {
            log::warn!("undecodable interaction: {err}");
            StatusCode::BAD_REQUEST
        })?;
        drop(payload);

        let reply = self.bot.on_message(interaction).await;
        let bytes = serde_json::to_vec(&reply).map_err(|err| {
            log::error!("could not serialize interaction response: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        let mut res = Response::new(Full::new(Bytes::from(bytes)));
        res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(res)
    }
}
