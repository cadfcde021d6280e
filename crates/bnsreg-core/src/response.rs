use serde::Deserialize;

use crate::action::Action;

/// Body the bridge answers every call with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// What a single bridge exchange means for the dispatch chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// The naming entry has to be created before this action can succeed.
    MissingEntry,
    /// Bridge refused the call; worth retrying.
    Rejected(String),
    /// An answer that is not a bridge response, whatever its status. Terminal.
    Malformed(String),
}

pub fn classify(status: u16, body: &str, action: Action, sentinel: &str) -> Verdict {
    let resp = match serde_json::from_str::<BridgeResponse>(body) {
        Ok(resp) => resp,
        Err(e) => return Verdict::Malformed(format!("http {}: {}", status, e)),
    };

    if resp.success {
        return Verdict::Success;
    }

    let message = resp.message.unwrap_or_default();
    // create is the compensating call itself; it never cascades.
    if action != Action::Create && !sentinel.is_empty() && message.contains(sentinel) {
        Verdict::MissingEntry
    } else {
        Verdict::Rejected(message)
    }
}
