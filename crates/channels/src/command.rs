//! Command-prefix detection.

use lunabridge_core::channel::InboundEvent;

/// The only transport message type that can carry a command.
pub const CHAT_KIND: &str = "chat";

/// Extract the prompt from `event` if it is a `prefix` command.
///
/// The event must be a `chat` message whose trimmed body starts with the
/// prefix followed by a space, compared ASCII case-insensitively. The
/// returned prompt has the prefix removed and is trimmed; it is never empty.
pub fn parse_command(event: &InboundEvent, prefix: &str) -> Option<String> {
    if event.kind != CHAT_KIND || prefix.is_empty() {
        return None;
    }

    let body = event.body.trim();
    let bytes = body.as_bytes();
    let n = prefix.len();
    if bytes.len() <= n || bytes[n] != b' ' || !bytes[..n].eq_ignore_ascii_case(prefix.as_bytes()) {
        return None;
    }

    let prompt = body[n + 1..].trim();
    (!prompt.is_empty()).then(|| prompt.to_string())
}
