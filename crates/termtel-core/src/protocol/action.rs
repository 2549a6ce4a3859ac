//! Session ids and action tags shared with the backend.

/// Well-known session ids.
pub mod session {
    pub const TERMINAL: &str = "terminal";
    pub const TELEMETRY: &str = "telemetry";
    pub const UI_STATE: &str = "ui_state";
}

// Backend -> bridge.
pub const CONNECTED: &str = "connected";
pub const DISCONNECTED: &str = "disconnected";
pub const TELEMETRY_UPDATE: &str = "telemetry_update";
pub const ERROR: &str = "error";
pub const DATA: &str = "data";
pub const THEME_CHANGED: &str = "theme_changed";

// Bridge -> backend.
pub const CONNECT: &str = "connect";
pub const DISCONNECT: &str = "disconnect";
pub const RESIZE: &str = "resize";
pub const GET_DEVICE_INFO: &str = "get_device_info";
pub const GET_INTERFACES: &str = "get_interfaces";
pub const GET_NEIGHBORS: &str = "get_neighbors";
pub const GET_ROUTES: &str = "get_routes";
pub const GET_ENVIRONMENT: &str = "get_environment";
pub const SET_THEME: &str = "set_theme";
pub const GET_THEME: &str = "get_theme";

/// Action a correlated response to `request_action` must carry.
pub fn response_action(request_action: &str) -> &'static str {
    match request_action {
        GET_THEME | SET_THEME => THEME_CHANGED,
        _ => TELEMETRY_UPDATE,
    }
}

/// Actions the backend is known to emit.
pub fn is_known_inbound(action: &str) -> bool {
    matches!(
        action,
        CONNECTED | DISCONNECTED | TELEMETRY_UPDATE | ERROR | DATA | THEME_CHANGED
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_requests_correlate_on_theme_changed() {
        assert_eq!(response_action(GET_THEME), THEME_CHANGED);
        assert_eq!(response_action(GET_ENVIRONMENT), TELEMETRY_UPDATE);
        assert_eq!(response_action("get_anything_else"), TELEMETRY_UPDATE);
    }
}
