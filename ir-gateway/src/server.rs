//! HTTP front end
//!
//! | Path | Description |
//! |------|-------------|
//! | `/switch?id=<key>` | Queue the code for button `<key>` |
//! | anything else | Reported as an invalid request |
//!
//! Every response is a 200 HTML page with one status line. Handlers only
//! look up the button and enqueue it; playback happens on the transmit
//! worker.

use std::future::Future;

use axum::{
    extract::State,
    http::Uri,
    response::Html,
    routing::get,
    Router,
};
use ir_tx::TransmitQueue;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::buttons::ButtonTable;
use crate::error::RequestError;

/// Page title
pub const PAGE_TITLE: &str = "Roblin Wifi gateway";

/// Shared state passed to all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Known buttons
    pub buttons: ButtonTable,
    /// Transmit worker's queue
    pub queue: TransmitQueue,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/switch", get(handle_request))
        .fallback(handle_request)
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Extract the key from a request target
///
/// Only `/switch?id=<key>` is accepted: exactly one `?`, and a query of
/// exactly one `=` whose name is `id`. The key is taken verbatim.
pub fn parse_switch(target: &str) -> Result<&str, RequestError> {
    let invalid = || RequestError::Invalid(target.to_string());

    let (path, query) = match target.split('?').collect::<Vec<_>>()[..] {
        [path, query] => (path, query),
        _ => return Err(invalid()),
    };
    if path != "/switch" {
        return Err(invalid());
    }

    match query.split('=').collect::<Vec<_>>()[..] {
        ["id", key] => Ok(key),
        _ => Err(invalid()),
    }
}

/// Resolve a request target and queue its code
///
/// Returns the key that was switched.
pub fn dispatch<'a>(state: &AppState, target: &'a str) -> Result<&'a str, RequestError> {
    let key = parse_switch(target)?;
    let code = state
        .buttons
        .get(key)
        .ok_or_else(|| RequestError::UnknownKey(key.to_string()))?;

    let depth = state.queue.enqueue(key, code);
    debug!("Queued '{}' ({} pending)", key, depth);
    Ok(key)
}

async fn handle_request(State(state): State<AppState>, uri: Uri) -> Html<String> {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    debug!("Received '{}'", target);

    let page = match dispatch(&state, target) {
        Ok(key) => {
            info!("Switching '{}'", key);
            render_page("Switching", key)
        }
        Err(e) => {
            info!("{}", e);
            render_page(e.label(), e.subject())
        }
    };

    Html(page)
}

/// The status page: `<label> <b>'<subject>'</b>`, with `subject` escaped
pub fn render_page(label: &str, subject: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body><p>{} <b>'{}'</b></p></body></html>",
        PAGE_TITLE,
        label,
        escape_html(subject)
    )
}

/// Escape text for an HTML body
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ir_tx::QueueOrder;
    use proptest::prelude::*;

    use crate::settings::roblin_buttons;

    fn state() -> AppState {
        AppState {
            buttons: ButtonTable::new(roblin_buttons()),
            queue: TransmitQueue::new(QueueOrder::Fifo),
        }
    }

    #[test]
    fn test_parse_accepts_switch() {
        assert_eq!(parse_switch("/switch?id=light"), Ok("light"));
        assert_eq!(parse_switch("/switch?id="), Ok(""));
    }

    #[test]
    fn test_parse_takes_query_verbatim() {
        assert_eq!(parse_switch("/switch?id=light&x"), Ok("light&x"));
        assert_eq!(parse_switch("/switch?id=pl%75s"), Ok("pl%75s"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for target in [
            "/",
            "/switch",
            "/switch?",
            "/switch?id",
            "/switch?key=light",
            "/switch?id=light=on",
            "/switch?id=light?x",
            "/other?id=light",
            "/switch/?id=light",
        ] {
            assert_eq!(
                parse_switch(target),
                Err(RequestError::Invalid(target.to_string())),
                "{}",
                target
            );
        }
    }

    #[test]
    fn test_dispatch_known_key_enqueues() {
        let state = state();
        assert_eq!(dispatch(&state, "/switch?id=power"), Ok("power"));

        let request = state.queue.pop().unwrap();
        assert_eq!(request.id, "power");
        assert_eq!(request.code.len(), 17);
    }

    #[test]
    fn test_dispatch_unknown_key_enqueues_nothing() {
        let state = state();
        assert_eq!(
            dispatch(&state, "/switch?id=volume"),
            Err(RequestError::UnknownKey("volume".into()))
        );
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_render_escapes_subject() {
        let page = render_page("Unknown key", "<script>");
        assert!(page.contains("<title>Roblin Wifi gateway</title>"));
        assert!(page.contains("<p>Unknown key <b>'&lt;script&gt;'</b></p>"));
        assert!(!page.contains("<script>"));
    }

    proptest! {
        #[test]
        fn prop_escaped_text_has_no_markup(text in ".*") {
            let escaped = escape_html(&text);
            prop_assert!(!escaped.contains('<'));
            prop_assert!(!escaped.contains('>'));
            prop_assert!(!escaped.contains('"'));
        }
    }
}
