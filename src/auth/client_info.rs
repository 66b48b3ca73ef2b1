use actix_web::{http::header, HttpRequest};

const MAX_USER_AGENT_LENGTH: usize = 512;

/// Caller metadata recorded on sessions and audit entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// The address is the socket peer; `Forwarded` and `X-Forwarded-For`
    /// are client-controlled and ignored.
    pub fn from_request(req: &HttpRequest) -> Self {
        let ip_address = req.peer_addr().map(|addr| addr.ip().to_string());

        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LENGTH).collect());

        Self {
            ip_address,
            user_agent,
        }
    }
}
