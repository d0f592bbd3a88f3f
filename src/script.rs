//! HTTP control-surface dispatch contract.
//!
//! The HTTP server itself is out of scope (spec.md §1); this defines only
//! the contract it would dispatch named requests through, letting
//! application code expose core state (e.g. a servo's target position) as a
//! named endpoint without this crate building the server.

/// Handles one named script endpoint, given its request parameters as
/// `(name, value)` pairs, and returns the response body.
pub trait ScriptHandler: Send + Sync {
    fn handle(&self, args: &[(String, String)]) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    impl ScriptHandler for EchoHandler {
        fn handle(&self, args: &[(String, String)]) -> String {
            args.iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&")
        }
    }

    #[test]
    fn handler_formats_args() {
        let handler = EchoHandler;
        let out = handler.handle(&[
            ("position".to_string(), "100".to_string()),
            ("speed".to_string(), "50".to_string()),
        ]);
        assert_eq!(out, "position=100&speed=50");
    }
}
